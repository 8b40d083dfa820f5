//! Client configuration layered from defaults and `API_*` environment variables.

// crates.io
use figment::{
	Figment,
	providers::{Env, Serialized},
};
// self
use crate::{_prelude::*, error::ConfigError};

/// Settings shared by the client facade and the refresher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Base URL every relative endpoint is resolved against.
	/// Env: `API_BASE_URL`. Default: `http://localhost:8000/api`.
	pub base_url: Url,
	/// Per-attempt deadline in milliseconds.
	/// Env: `API_TIMEOUT_MS`. Default: `30000`.
	pub timeout_ms: u64,
	/// Enables development-mode request/response logging.
	/// Env: `API_DEBUG`. Default: `false`.
	pub debug: bool,
	/// Refresh endpoint, relative to the base URL.
	/// Env: `API_REFRESH_PATH`. Default: `/auth/refresh`.
	pub refresh_path: String,
	/// Health endpoint, relative to the base URL.
	/// Env: `API_HEALTH_PATH`. Default: `/health`.
	pub health_path: String,
	/// Default upload endpoint, relative to the base URL.
	/// Env: `API_UPLOAD_PATH`. Default: `/upload`.
	pub upload_path: String,
}
impl ClientConfig {
	/// Environment variable prefix.
	pub const ENV_PREFIX: &'static str = "API_";
	/// Default base URL.
	pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8000/api";
	/// Default per-attempt deadline.
	pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

	/// Creates a configuration for `base_url` with every other field defaulted.
	pub fn new(base_url: Url) -> Self {
		Self { base_url, ..Default::default() }
	}

	/// Builds a Figment that merges defaults and `API_*` environment variables.
	pub fn figment() -> Figment {
		Figment::new()
			.merge(Serialized::defaults(ClientConfig::default()))
			.merge(Env::prefixed(Self::ENV_PREFIX))
	}

	/// Loads configuration from the environment (with defaults).
	pub fn from_env() -> Result<Self> {
		let config: Self = Self::figment().extract().map_err(ConfigError::from)?;

		config.validate()?;

		Ok(config)
	}

	/// Overrides the per-attempt deadline.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Toggles development-mode logging.
	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = debug;

		self
	}

	/// Per-attempt deadline.
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	/// Resolves `path` against the base URL, keeping the base path (`/api`) intact.
	///
	/// Absolute `http`/`https` URLs are returned unchanged; anything else, including
	/// scheme-like paths such as `surveys:export`, stays under the base URL.
	pub fn endpoint(&self, path: &str) -> Result<Url> {
		if let Some(absolute) =
			Url::parse(path).ok().filter(|url| matches!(url.scheme(), "http" | "https"))
		{
			return Ok(absolute);
		}

		let mut base = self.base_url.clone();

		if !base.path().ends_with('/') {
			let with_slash = format!("{}/", base.path());

			base.set_path(&with_slash);
		}

		// The `./` prefix keeps a leading `segment:` from being read as a scheme.
		base.join(&format!("./{}", path.trim_start_matches('/'))).map_err(|source| {
			ConfigError::InvalidEndpoint { endpoint: path.to_owned(), source }.into()
		})
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase(self.base_url.clone()));
		}

		Ok(())
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: Url::parse(Self::DEFAULT_BASE_URL)
				.expect("Default base URL must be a valid URL."),
			timeout_ms: Self::DEFAULT_TIMEOUT_MS,
			debug: false,
			refresh_path: "/auth/refresh".into(),
			health_path: "/health".into(),
			upload_path: "/upload".into(),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use figment::Jail;
	// self
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let config = ClientConfig::default();

		assert_eq!(config.base_url.as_str(), "http://localhost:8000/api");
		assert_eq!(config.timeout(), Duration::from_secs(30));
		assert!(!config.debug);
	}

	#[test]
	fn endpoint_keeps_base_path() {
		let config = ClientConfig::default();

		assert_eq!(
			config.endpoint("/surveys").expect("Endpoint should resolve.").as_str(),
			"http://localhost:8000/api/surveys"
		);
		assert_eq!(
			config.endpoint("auth/refresh").expect("Endpoint should resolve.").as_str(),
			"http://localhost:8000/api/auth/refresh"
		);
		assert_eq!(
			config
				.endpoint("https://cdn.example.com/file.pdf")
				.expect("Absolute URL should pass through.")
				.as_str(),
			"https://cdn.example.com/file.pdf"
		);
	}

	#[test]
	fn non_http_schemes_resolve_under_base_url() {
		let config = ClientConfig::default();

		assert_eq!(
			config.endpoint("surveys:export").expect("Endpoint should resolve.").as_str(),
			"http://localhost:8000/api/surveys:export"
		);
		assert_eq!(
			config.endpoint("/surveys:export").expect("Endpoint should resolve.").as_str(),
			"http://localhost:8000/api/surveys:export"
		);
	}

	#[test]
	fn environment_overrides_defaults() {
		Jail::expect_with(|jail| {
			jail.set_env("API_BASE_URL", "https://api.example.com/v2");
			jail.set_env("API_DEBUG", "true");
			jail.set_env("API_TIMEOUT_MS", "5000");

			let config = ClientConfig::from_env().expect("Environment config should load.");

			assert_eq!(config.base_url.as_str(), "https://api.example.com/v2");
			assert!(config.debug);
			assert_eq!(config.timeout(), Duration::from_secs(5));
			assert_eq!(config.refresh_path, "/auth/refresh");

			Ok(())
		});
	}

	#[test]
	fn invalid_environment_values_surface_config_errors() {
		Jail::expect_with(|jail| {
			jail.set_env("API_BASE_URL", "not a url");

			let err = ClientConfig::from_env().expect_err("Invalid base URL must be rejected.");

			assert!(matches!(err, Error::Config(ConfigError::Load(_))));

			Ok(())
		});
	}
}
