use std::path::Path;

/// Rewrite a relative path into its forward-slash id form.
pub fn as_posix_id(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
