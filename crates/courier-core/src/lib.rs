//! courier-core
//!
//! Core building blocks for the Courier task pipeline: idempotent admission,
//! queued dispatch, status-gated execution, backoff via redelivery delay and
//! dead-letter forensics.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, envelope, outcome, errors, context）
//! - **ports**: 抽象化レイヤー（TaskStore, TaskQueue, DeliverySource, TaskExecutor, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, submit, process, forensics, retry, worker, status）
//! - **impls**: 実装（InMemoryTaskStore, InMemoryTaskQueue, executors）
//! - **boundary**: HTTP 相当の request / response
//! - **config**: 上書き可能な limits
//! - **observability**: tracing 初期化とカウンタ

pub mod app;
pub mod boundary;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

#[cfg(test)]
mod integration_tests;
