//! IO modules - filesystem side effects

pub mod copy;
