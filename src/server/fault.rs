//! # Simulación de Fallos
//! src/server/fault.rs
//!
//! Hook opcional que corre después de parsear el request y antes de
//! resolver el path. Solo existe si la configuración trae
//! `failure_simulation`.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::FailureSimulation;
use crate::http::StatusCode;

/// Devuelve un 500/503 para una fracción `rate` de los requests
#[derive(Debug, Clone)]
pub struct FailureInjector {
    rate: f64,
    statuses: Vec<StatusCode>,
}

impl FailureInjector {
    /// Códigos que no sean 500/503 se ignoran
    pub fn new(rate: f64, statuses: &[u16]) -> Self {
        let statuses = statuses
            .iter()
            .filter_map(|code| StatusCode::from_u16(*code))
            .filter(StatusCode::is_server_error)
            .collect();

        Self {
            rate: rate.clamp(0.0, 1.0),
            statuses,
        }
    }

    pub fn from_config(simulation: &FailureSimulation) -> Self {
        Self::new(simulation.rate, &simulation.statuses)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// `Some(status)` si este request debe fallar
    pub fn roll(&self) -> Option<StatusCode> {
        self.roll_with(&mut rand::thread_rng())
    }

    pub fn roll_with<R: Rng>(&self, rng: &mut R) -> Option<StatusCode> {
        if self.statuses.is_empty() || !rng.gen_bool(self.rate) {
            return None;
        }
        self.statuses.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_always_fails() {
        let injector = FailureInjector::new(1.0, &[500, 503]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let status = injector.roll_with(&mut rng).unwrap();
            assert!(matches!(
                status,
                StatusCode::InternalServerError | StatusCode::ServiceUnavailable
            ));
        }
    }

    #[test]
    fn test_never_fails() {
        let injector = FailureInjector::new(0.0, &[500]);
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|_| injector.roll_with(&mut rng).is_none()));
    }

    #[test]
    fn test_rate_is_respected() {
        let injector = FailureInjector::new(0.3, &[503]);
        let mut rng = StdRng::seed_from_u64(42);

        let failures = (0..10_000)
            .filter(|_| injector.roll_with(&mut rng).is_some())
            .count();
        assert!((2_500..3_500).contains(&failures), "failures = {}", failures);
    }

    #[test]
    fn test_non_server_errors_ignored() {
        let injector = FailureInjector::new(1.0, &[404, 200]);
        assert!(injector.roll().is_none());
    }

    #[test]
    fn test_rate_clamped() {
        assert_eq!(FailureInjector::new(3.0, &[500]).rate(), 1.0);
        assert_eq!(FailureInjector::new(-1.0, &[500]).rate(), 0.0);
    }
}
