mod common;
mod relation;
