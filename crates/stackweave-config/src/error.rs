use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Stack file not found. Looked in:\n\
        - current directory: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl\n\
        - ./.stackweave/\n\
        - ~/.config/stackweave/stack.kdl\n\
        Set STACKWEAVE_STACK_PATH to point at a file directly"
    )]
    StackFileNotFound,

    #[error("Invalid settings in {path}: {message}")]
    InvalidSettings { path: String, message: String },

    #[error("Failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
