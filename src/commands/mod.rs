//! # CLI Subcommands
//!
//! Contains modules that run the subcommands.

pub mod mkdsk;
pub mod import;
pub mod stat;
pub mod get;
pub mod commit;

#[derive(thiserror::Error,Debug)]
pub enum CommandError {
    #[error("Command could not be interpreted")]
    InvalidCommand,
    #[error("One of the parameters was out of range")]
    OutOfRange,
    #[error("Output file already exists")]
    FileExists,
    #[error("File not found")]
    FileNotFound,
    #[error("Device reported unit check")]
    UnitCheck
}

/// Refuse to clobber an existing file
fn check_output(path: &str) -> crate::STDRESULT {
    if std::path::Path::new(path).exists() {
        eprintln!("{} already exists",path);
        return Err(Box::new(CommandError::FileExists));
    }
    Ok(())
}

fn check_input(path: &str) -> crate::STDRESULT {
    if !std::path::Path::new(path).exists() {
        eprintln!("{} not found",path);
        return Err(Box::new(CommandError::FileNotFound));
    }
    Ok(())
}
