mod settings;

pub use settings::{
    LogFormat, LoggingConfig, MailerSettings, ServerConfig, Settings, SmtpConfig, TlsMode,
};
