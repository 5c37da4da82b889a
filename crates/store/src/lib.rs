#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//! - [`store`]: [`EventStore`] — 열기/스키마/삽입/범위 쿼리

pub mod store;

pub use store::EventStore;
