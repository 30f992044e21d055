//! # Encoding Module
//!
//! This module provides the key/RID wire format shared with the
//! heap-record layer: typed keys (int, float, text) and 8-byte record
//! locators, with identical encoding on both sides of the index/record
//! boundary.

pub mod key;

pub use key::{compare_encoded, Key, KeyType, Rid};
