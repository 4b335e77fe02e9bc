mod common;
mod deploy_tests;
mod investor_tests;
mod manifest_tests;
