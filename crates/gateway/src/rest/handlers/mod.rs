//! REST-Handler Module

pub mod crypto;
