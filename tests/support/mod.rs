#![allow(dead_code)]

pub mod mltrain_env;
pub mod stub_api;
