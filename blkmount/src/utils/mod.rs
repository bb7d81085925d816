// SPDX-License-Identifier: MIT

mod log;

pub use log::*;
