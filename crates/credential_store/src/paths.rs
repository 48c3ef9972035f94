use std::path::{Path, PathBuf};

pub const CREDENTIAL_DIR: &str = "assistant-runtime";
pub const CREDENTIAL_FILE_NAME: &str = "credential.json";

#[must_use]
pub fn credential_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CREDENTIAL_DIR).join(CREDENTIAL_FILE_NAME)
}
