//! End-to-end scenarios exercising the broker through its public API only.

mod scenarios;
