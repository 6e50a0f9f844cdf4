use crate::als::Hyperparameters;

/// Everything a caller can configure about training and querying. Missing fields in a
/// deserialized configuration fall back to the defaults, which match the settings we use for the
/// last.fm play counts.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Options {
    pub num_factors: usize,
    pub num_iterations: usize,
    pub regularization: f64,
    pub alpha: f64,
    pub random_seed: u64,
    pub filter_known: bool,
}

impl Options {

    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            num_factors: self.num_factors,
            num_iterations: self.num_iterations,
            regularization: self.regularization,
            alpha: self.alpha,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        let hyperparameters = Hyperparameters::default();

        Options {
            num_factors: hyperparameters.num_factors,
            num_iterations: hyperparameters.num_iterations,
            regularization: hyperparameters.regularization,
            alpha: hyperparameters.alpha,
            random_seed: 42,
            filter_known: true,
        }
    }
}

#[cfg(test)]
mod tests {

    use crate::options::Options;

    #[test]
    fn partial_configuration() {

        let options: Options = serde_json::from_str(
            r#"{ "num_factors": 8, "filter_known": false }"#).unwrap();

        assert_eq!(options.num_factors, 8);
        assert!(!options.filter_known);
        assert_eq!(options.num_iterations, 5);
        assert_eq!(options.random_seed, 42);

        let hyperparameters = options.hyperparameters();
        assert_eq!(hyperparameters.num_factors, 8);
        assert_eq!(hyperparameters.regularization, 0.01);
        assert_eq!(hyperparameters.alpha, 1.0);
    }
}
