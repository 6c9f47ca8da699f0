// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

mod errors;

pub use errors::Error;
pub use errors::Result;
