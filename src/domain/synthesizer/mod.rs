pub mod descriptor;
pub mod launch;

/// A generated file, kept in memory until the whole compilation succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,

    /// Written with execute permission.
    pub executable: bool,
}

impl Artifact {
    pub fn text(file_name: &str, contents: String) -> Self {
        Self { file_name: file_name.to_string(), contents, executable: false }
    }

    pub fn script(file_name: &str, contents: String) -> Self {
        Self { file_name: file_name.to_string(), contents, executable: true }
    }
}
