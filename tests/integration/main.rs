//! Integration tests for svexpress.
//!
//! These tests run the built binary against shell-script stand-ins for the external tools,
//! covering end-to-end runs as well as the utility commands.

mod helpers;
mod test_express_command;
mod test_express_errors;
mod test_libraries_command;
mod test_sniff_command;
