//! Concrete object stores, task scripts and the wiring that turns an
//! [`AppConfig`](imgtask_core::api::AppConfig) into running services.
pub mod factory;
pub mod scripts;
pub mod services;
pub mod store;
