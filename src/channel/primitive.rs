// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Convenience aliases for channels of primitive numeric types, matching
//! the named primitive channel variants in spec §6's external interface
//! list (e.g. host bindings that only ever move raw numbers in and out of
//! the runtime, with no user struct to describe).

use super::Channel;
use std::sync::Arc;

pub type Int32Channel = Channel<i32>;
pub type Int64Channel = Channel<i64>;
pub type Float32Channel = Channel<f32>;
pub type Float64Channel = Channel<f64>;

#[must_use]
pub fn int32_channel() -> Arc<Int32Channel> {
    Channel::new()
}

#[must_use]
pub fn int64_channel() -> Arc<Int64Channel> {
    Channel::new()
}

#[must_use]
pub fn float32_channel() -> Arc<Float32Channel> {
    Channel::new()
}

#[must_use]
pub fn float64_channel() -> Arc<Float64Channel> {
    Channel::new()
}
