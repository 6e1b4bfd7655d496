//! Command line front end for `lumpkit_archive`.

pub mod commands;
