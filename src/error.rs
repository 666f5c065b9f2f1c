use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("no such file or directory: {0}")]
    NoSuchEntry(String),

    #[error("name already in use: {0}")]
    AlreadyExists(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("device or resource busy: {0}")]
    Busy(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("extended attribute already present: {0}")]
    XattrExists(String),

    #[error("no such extended attribute: {0}")]
    NoData(String),

    #[error("buffer too small for: {0}")]
    Range(String),

    #[error("cannot parse argument: {0}")]
    ArgumentParse(String),

    #[error("mount failed: {0}")]
    Mount(String),
}

impl ScratchError {
    /// The POSIX error code the bridge negates and hands back to the kernel.
    pub fn errno(&self) -> libc::c_int {
        match self {
            ScratchError::NoSuchEntry(_) => libc::ENOENT,
            ScratchError::AlreadyExists(_) => libc::EEXIST,
            ScratchError::IsDirectory(_) => libc::EISDIR,
            ScratchError::Busy(_) => libc::EBUSY,
            ScratchError::NotADirectory(_) => libc::ENOTDIR,
            ScratchError::NotEmpty(_) => libc::ENOTEMPTY,
            ScratchError::XattrExists(_) => libc::EEXIST,
            ScratchError::NoData(_) => libc::ENODATA,
            ScratchError::Range(_) => libc::ERANGE,
            ScratchError::ArgumentParse(_) => libc::EINVAL,
            ScratchError::Mount(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScratchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(ScratchError::NoSuchEntry("/x".into()).errno(), libc::ENOENT);
        assert_eq!(ScratchError::NotEmpty("/d".into()).errno(), libc::ENOTEMPTY);
        assert_eq!(ScratchError::NoData("user.k".into()).errno(), libc::ENODATA);
        assert_eq!(ScratchError::Range("user.k".into()).errno(), libc::ERANGE);
        assert_eq!(ScratchError::XattrExists("user.k".into()).errno(), libc::EEXIST);
    }
}
