use approx::assert_abs_diff_eq;

use dslab_power_models::cpu::CpuPowerModel;
use dslab_power_models::registry::{PowerModelError, PowerModelRegistry};

#[derive(Clone)]
struct ConstantModel {
    power: f64,
}

impl CpuPowerModel for ConstantModel {
    fn get_power(&self, _utilization: f64) -> f64 {
        self.power
    }

    fn max_power(&self) -> f64 {
        self.power
    }

    fn static_power(&self) -> f64 {
        self.power
    }
}

#[test]
fn test_builtin_aliases() {
    let registry = PowerModelRegistry::new();
    for alias in ["Linear", "Square", "SquareRoot", "Square root", "Cubic"] {
        assert!(registry.contains(alias));
        let model = registry.resolve(alias, 100., 0.5).unwrap();
        assert_abs_diff_eq!(model.get_power(0.), 50., epsilon = 1e-9);
        assert_abs_diff_eq!(model.get_power(1.), 100., epsilon = 1e-9);
    }
    assert_abs_diff_eq!(registry.resolve("Square root", 100., 0.5).unwrap().get_power(0.25), 75., epsilon = 1e-9);
}

#[test]
fn test_unknown_alias() {
    let registry = PowerModelRegistry::new();
    assert_eq!(
        registry.resolve("Quartic", 100., 0.5).err(),
        Some(PowerModelError::UnknownModel("Quartic".to_string()))
    );
    assert!(PowerModelRegistry::empty().resolve("Linear", 100., 0.5).is_err());
}

#[test]
fn test_invalid_parameters() {
    let registry = PowerModelRegistry::new();
    assert!(matches!(
        registry.resolve("Linear", 0., 0.5),
        Err(PowerModelError::InvalidParameters { .. })
    ));
    assert!(matches!(
        registry.resolve("Linear", 100., 1.5),
        Err(PowerModelError::InvalidParameters { .. })
    ));
}

#[test]
fn test_user_defined_model() {
    let mut registry = PowerModelRegistry::new();
    registry.register("Constant", |max_power, _| Box::new(ConstantModel { power: max_power }));
    assert!(registry.aliases().contains(&"Constant".to_string()));
    let model = registry.resolve("Constant", 42., 0.).unwrap();
    assert_abs_diff_eq!(model.get_power(0.3), 42., epsilon = 1e-9);
}
