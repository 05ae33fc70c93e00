use super::parsing::{
    env_optional, env_or_default, parse_attempt_limit, parse_bool, parse_cors_origins,
    parse_environment, parse_positive_u64, parse_u16, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, ApiSettings, AssignmentSettings, ConfigError, CorsSettings, DatabaseSettings,
    MailSettings, RedisSettings, RunnerSettings, RuntimeSettings, SchedulerSettings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("TALENTTRACK_HOST", "0.0.0.0");
        let port = env_or_default("TALENTTRACK_PORT", "8000");

        let environment = parse_environment(
            env_optional("TALENTTRACK_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("TALENTTRACK_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "TalentTrack API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "talenttrack");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "talenttrack");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let runner_base_url =
            env_or_default("RUNNER_BASE_URL", "").trim_end_matches('/').to_string();
        let runner_secret = env_or_default("RUNNER_SECRET", "");
        let runner_timeout_ms =
            parse_positive_u64("RUNNER_TIMEOUT_MS", env_or_default("RUNNER_TIMEOUT_MS", "2000"))?;
        let runner_max_output_chars = parse_positive_u64(
            "RUNNER_MAX_OUTPUT_CHARS",
            env_or_default("RUNNER_MAX_OUTPUT_CHARS", "20000"),
        )?;
        let runner_batch_timeout_ms = parse_positive_u64(
            "RUNNER_BATCH_TIMEOUT_MS",
            env_or_default("RUNNER_BATCH_TIMEOUT_MS", "10000"),
        )?;

        let smtp_host = env_or_default("SMTP_HOST", "");
        let smtp_port = parse_u16("SMTP_PORT", env_or_default("SMTP_PORT", "587"))?;
        let smtp_username = env_or_default("SMTP_USERNAME", "");
        let smtp_password = env_or_default("SMTP_PASSWORD", "");
        let smtp_tls = env_optional("SMTP_TLS").map(|value| parse_bool(&value)).unwrap_or(true);
        let from_name = env_or_default("MAIL_FROM_NAME", "TalentTrack");
        let from_email = env_or_default("MAIL_FROM_EMAIL", "");
        let send_disabled =
            env_optional("EMAIL_SEND_DISABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let practice_expiry_hours = parse_positive_u64(
            "PRACTICE_EXPIRY_HOURS",
            env_or_default("PRACTICE_EXPIRY_HOURS", "24"),
        )?;
        let practice_attempt_limit = parse_attempt_limit(
            "PRACTICE_ATTEMPT_LIMIT",
            env_or_default("PRACTICE_ATTEMPT_LIMIT", "10"),
        )?;
        let default_attempt_limit = parse_attempt_limit(
            "DEFAULT_ATTEMPT_LIMIT",
            env_or_default("DEFAULT_ATTEMPT_LIMIT", "1"),
        )?;
        let run_rate_limit_per_minute = parse_u64(
            "RUN_RATE_LIMIT_PER_MINUTE",
            env_or_default("RUN_RATE_LIMIT_PER_MINUTE", "20"),
        )?;

        let expiry_sweep_interval_seconds = parse_positive_u64(
            "EXPIRY_SWEEP_INTERVAL_SECONDS",
            env_or_default("EXPIRY_SWEEP_INTERVAL_SECONDS", "60"),
        )?;
        let monthly_report_interval_seconds = parse_positive_u64(
            "MONTHLY_REPORT_INTERVAL_SECONDS",
            env_or_default("MONTHLY_REPORT_INTERVAL_SECONDS", "86400"),
        )?;
        let submission_recovery_interval_seconds = parse_positive_u64(
            "SUBMISSION_RECOVERY_INTERVAL_SECONDS",
            env_or_default("SUBMISSION_RECOVERY_INTERVAL_SECONDS", "60"),
        )?;
        let submission_recovery_grace_seconds = parse_positive_u64(
            "SUBMISSION_RECOVERY_GRACE_SECONDS",
            env_or_default("SUBMISSION_RECOVERY_GRACE_SECONDS", "120"),
        )?;

        let first_admin_email = env_or_default("FIRST_ADMIN_EMAIL", "");
        let first_admin_name = env_or_default("FIRST_ADMIN_NAME", "Administrator");
        let catalog_seed_path = env_optional("CATALOG_SEED_PATH");

        let log_level = env_or_default("TALENTTRACK_LOG_LEVEL", "info");
        let json = env_optional("TALENTTRACK_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            runner: RunnerSettings {
                base_url: runner_base_url,
                secret: runner_secret,
                timeout_ms: runner_timeout_ms,
                max_output_chars: runner_max_output_chars,
                batch_timeout_ms: runner_batch_timeout_ms,
            },
            mail: MailSettings {
                smtp_host,
                smtp_port,
                smtp_username,
                smtp_password,
                smtp_tls,
                from_name,
                from_email,
                send_disabled,
            },
            assignment: AssignmentSettings {
                practice_expiry_hours,
                practice_attempt_limit,
                default_attempt_limit,
                run_rate_limit_per_minute,
            },
            scheduler: SchedulerSettings {
                expiry_sweep_interval_seconds,
                monthly_report_interval_seconds,
                submission_recovery_interval_seconds,
                submission_recovery_grace_seconds,
            },
            admin: AdminSettings { first_admin_email, first_admin_name, catalog_seed_path },
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

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn runner(&self) -> &RunnerSettings {
        &self.runner
    }

    pub(crate) fn mail(&self) -> &MailSettings {
        &self.mail
    }

    pub(crate) fn assignment(&self) -> &AssignmentSettings {
        &self.assignment
    }

    pub(crate) fn scheduler(&self) -> &SchedulerSettings {
        &self.scheduler
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.timeout_ms > self.runner.batch_timeout_ms {
            return Err(ConfigError::InvalidValue {
                field: "RUNNER_TIMEOUT_MS",
                value: self.runner.timeout_ms.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if !self.runner.is_configured() {
            return Err(ConfigError::MissingSecret("RUNNER_BASE_URL/RUNNER_SECRET"));
        }
        if !self.mail.send_disabled
            && (self.mail.smtp_host.is_empty() || self.mail.from_email.is_empty())
        {
            return Err(ConfigError::MissingSecret("SMTP_HOST/MAIL_FROM_EMAIL"));
        }

        Ok(())
    }
}
