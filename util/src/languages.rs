use std::path::Path;

/// Languages the native runner knows how to build and run, recognised by
/// source file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
    Rust,
}

impl Language {
    /// Maps a source file extension to its language.
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext {
            "c" => Some(Language::C),
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    /// Language of a source file, judged by extension only.
    pub fn of_path(path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
    }

    /// Entry file looked for when more than one source file is present.
    /// `None` means every source file is compiled together.
    pub fn main_filename(self) -> Option<&'static str> {
        match self {
            Language::C | Language::Cpp => None,
            Language::Java => Some("Main.java"),
            Language::Python => Some("main.py"),
            Language::Rust => Some("main.rs"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Rust => "rust",
        }
    }
}
