use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_short_answer_match, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, RuntimeSettings,
    ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAM_HOST", "0.0.0.0");
        let port = env_or_default("EXAM_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAM_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAM_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "THPTQG Exam Engine");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exam");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "30"),
        )?;

        let violation_threshold = parse_u32(
            "EXAM_VIOLATION_THRESHOLD",
            env_or_default("EXAM_VIOLATION_THRESHOLD", "5"),
        )?;
        let short_answer_match = parse_short_answer_match(env_optional("EXAM_SHORT_ANSWER_MATCH"))?;
        let rescore_finalized =
            env_optional("EXAM_RESCORE_FINALIZED").map(|value| parse_bool(&value)).unwrap_or(false);
        let live_ranking =
            env_optional("EXAM_LIVE_RANKING").map(|value| parse_bool(&value)).unwrap_or(false);
        let max_upload_size_mb =
            parse_u64("EXAM_MAX_UPLOAD_SIZE_MB", env_or_default("EXAM_MAX_UPLOAD_SIZE_MB", "10"))?;

        let log_level = env_or_default("EXAM_LOG_LEVEL", "info");
        let json = env_optional("EXAM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            exam: ExamSettings {
                violation_threshold,
                short_answer_match,
                rescore_finalized,
                live_ranking,
                max_upload_size_mb,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.violation_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_VIOLATION_THRESHOLD",
                value: "0".to_string(),
            });
        }

        if self.exam.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_MAX_UPLOAD_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::{Settings, ShortAnswerMatch};
    use crate::test_support;

    #[tokio::test]
    async fn load_uses_exam_defaults() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.exam().violation_threshold, 5);
        assert_eq!(settings.exam().short_answer_match, ShortAnswerMatch::Whitespace);
        assert!(!settings.exam().rescore_finalized);
        assert!(!settings.exam().live_ranking);
        assert_eq!(settings.api().api_v1_str, "/api/v1");
    }

    #[tokio::test]
    async fn load_rejects_zero_threshold() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("EXAM_VIOLATION_THRESHOLD", "0");

        let result = Settings::load();
        std::env::remove_var("EXAM_VIOLATION_THRESHOLD");

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn strict_mode_requires_database_secret() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("POSTGRES_PASSWORD");
        std::env::set_var("EXAM_STRICT_CONFIG", "1");

        let result = Settings::load();
        std::env::set_var("EXAM_STRICT_CONFIG", "0");

        assert!(result.is_err());
    }
}
