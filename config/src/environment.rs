use std::fmt;
use std::io::Error;

/// Name of the environment variable which selects the runtime environment.
pub const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// The name of the development environment.
const DEV_ENV_NAME: &str = "dev";

/// The name of the production environment.
const PROD_ENV_NAME: &str = "prod";

/// Runtime environment of the process.
///
/// The environment selects which configuration overlay is loaded and how logs are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Development environment.
    Dev,
    /// Production environment.
    Prod,
}

impl Environment {
    /// Loads the environment from the `APP_ENVIRONMENT` env variable, defaulting to [`Environment::Dev`].
    pub fn load() -> Result<Environment, Error> {
        std::env::var(APP_ENVIRONMENT_ENV_NAME)
            .unwrap_or_else(|_| DEV_ENV_NAME.into())
            .try_into()
    }

    /// Returns the string name of the environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    /// Parses an [`Environment`] case-insensitively from `dev` or `prod`.
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Self::Dev),
            PROD_ENV_NAME => Ok(Self::Prod),
            other => Err(Error::other(format!(
                "{other} is not a supported environment. Use either `{DEV_ENV_NAME}` or `{PROD_ENV_NAME}`.",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_environments_case_insensitively() {
        assert_eq!(
            Environment::try_from("DEV".to_string()).unwrap(),
            Environment::Dev
        );
        assert_eq!(
            Environment::try_from("prod".to_string()).unwrap(),
            Environment::Prod
        );
    }

    #[test]
    fn rejects_unknown_environment() {
        let err = Environment::try_from("staging".to_string()).unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(Environment::Prod.to_string(), Environment::Prod.as_str());
    }
}
