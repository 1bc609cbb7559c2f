//! CLI module tests: stream splitting, event classification, process spawning.

mod process_test;
