#![allow(dead_code)]

pub mod generate;

pub use generate::*;
