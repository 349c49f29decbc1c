use crate::error::FileOpError;
use dialoguer::Confirm;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
};

fn read_file_impl(name: &'static str, path: &Path) -> Result<Vec<u8>, Box<FileOpError>> {
    let mut f = File::open(path)
        .map_err(|error| FileOpError::make_open(name, path.to_path_buf(), error))?;
    let mut v = Vec::new();
    f.read_to_end(&mut v)
        .map_err(|error| FileOpError::make_read(name, path.to_path_buf(), error))?;
    Ok(v)
}

/// Reads a local file from the specified path.
///
/// # Errors
/// This function will return a boxed `FileOpError` with either the `FileOpAction::Open` or the
/// `FileOpAction::Read` action in case an I/O error occurs while opening or reading the file.
pub fn read_file<P: AsRef<Path>>(name: &'static str, path: P) -> Result<Vec<u8>, Box<FileOpError>> {
    read_file_impl(name, path.as_ref())
}

fn ask_overwrite(path: &Path) -> bool {
    Confirm::new()
        .with_prompt(format!(
            "Do you want to overwrite the file at '{}'?",
            path.display()
        ))
        .default(false)
        .interact()
        .unwrap_or_else(|e| {
            warn!("Couldn't ask whether to overwrite {}: {}", path.display(), e);
            false
        })
}

fn create_file_impl(
    name: &'static str,
    path: &Path,
    overwrite: bool,
    silent: bool,
) -> Result<File, Box<FileOpError>> {
    let map_error = |error| FileOpError::make_create(name, path.to_path_buf(), error);
    let result = OpenOptions::new()
        .write(true)
        .create_new(!overwrite)
        .create(overwrite)
        .truncate(overwrite)
        .open(path)
        .map_err(map_error);

    let error = match result {
        Ok(file) => return Ok(file),
        Err(error) => error,
    };

    // Without the overwrite flag an existing file is only replaced after the user agrees, unless
    // prompting is disabled.
    if !overwrite && !silent && error.is_exists() && path.is_file() && ask_overwrite(path) {
        return OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(map_error);
    }

    Err(error)
}

/// Creates a local file at the specified path.
///
/// In case the `overwrite` argument is `true`, the file will be either created or truncated if it
/// exists, otherwise in case `silent` is `false` the user will be asked if overwriting the file is
/// ok, otherwise an error will be returned.
///
/// # Errors
/// This function will return a boxed `FileOpError` with the `FileOpAction::Create` action in case
/// an I/O error occurs while creating the file.
pub fn create_file<P: AsRef<Path>>(
    name: &'static str,
    path: P,
    overwrite: bool,
    silent: bool,
) -> Result<File, Box<FileOpError>> {
    create_file_impl(name, path.as_ref(), overwrite, silent)
}

/// Creates a local file at the specified path and writes data from a slice into it.
///
/// File creation is handled by the [`create_file`] function, see it for the meaning of the
/// `overwrite` and `silent` arguments.
///
/// # Errors
/// This function will return a boxed [`FileOpError`] with either [`FileOpAction::Create`] or
/// [`FileOpAction::Write`] action in case an I/O error occurs while either creating or writing the
/// file.
///
/// [`FileOpAction::Create`]: crate::error::FileOpAction::Create
/// [`FileOpAction::Write`]: crate::error::FileOpAction::Write
pub fn save_file<P: AsRef<Path>>(
    name: &'static str,
    path: P,
    data: &[u8],
    overwrite: bool,
    silent: bool,
) -> Result<(), Box<FileOpError>> {
    let path = path.as_ref();
    create_file(name, path, overwrite, silent)?
        .write_all(data)
        .map_err(|error| FileOpError::make_write(name, path.to_path_buf(), error))?;

    info!("Saved {} to {}.", name, path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileOpAction;

    #[test]
    fn save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon0.png");

        save_file("icon", &path, b"first", false, true).unwrap();
        assert_eq!(read_file("icon", &path).unwrap(), b"first");
    }

    #[test]
    fn existing_file_is_kept_when_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("param.sfo");
        save_file("sfo file", &path, b"first", false, true).unwrap();

        let error = save_file("sfo file", &path, b"second", false, true).unwrap_err();
        assert_eq!(error.action, FileOpAction::Create);
        assert!(error.is_exists());
        assert_eq!(read_file("sfo file", &path).unwrap(), b"first");

        save_file("sfo file", &path, b"second", true, true).unwrap();
        assert_eq!(read_file("sfo file", &path).unwrap(), b"second");
    }

    #[test]
    fn missing_file_reports_open() {
        let dir = tempfile::tempdir().unwrap();
        let error = read_file("image", dir.path().join("missing.png")).unwrap_err();

        assert_eq!(error.action, FileOpAction::Open);
        assert!(error.to_string().starts_with("failed to open image at path"));
    }
}
