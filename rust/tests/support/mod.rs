#![allow(dead_code)]

mod helpers;
mod scripted;

pub use helpers::*;
pub use scripted::*;
