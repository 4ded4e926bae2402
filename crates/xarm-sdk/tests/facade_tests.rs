//! 顶层导出与几何性质测试

use approx::assert_relative_eq;
use proptest::prelude::*;
use serial_test::serial;
use xarm_sdk::client::geometry::tool_axis_direction;
use xarm_sdk::client::planner::{MotionConfig, MotionLimits, plan};
use xarm_sdk::prelude::*;
use xarm_sdk::{AngleUnit, SpeedMultiplier};

#[test]
#[serial]
fn test_init_logger_is_idempotent() {
    xarm_sdk::init_logger();
    xarm_sdk::init_logger();
    tracing::info!("logger ready");
}

#[test]
fn test_facade_exports() {
    let snap = ControllerSnapshot::default();
    assert_eq!(snap.status, "idle");
    assert_eq!(snap.mode, Mode::Disconnected);
    assert_eq!(SpeedMultiplier::default(), SpeedMultiplier::X1);
    assert_eq!("x".parse::<Axis>().unwrap(), Axis::X);
}

#[test]
fn test_tool_down_z_axis_points_down() {
    let pose = Pose::new(300.0, 0.0, 200.0, 180.0, 0.0, 0.0);
    let dir = tool_axis_direction(&pose, Axis::Z, AngleUnit::Degree);
    assert_relative_eq!(dir.z, -1.0, epsilon = 1e-9);
}

proptest! {
    #[test]
    fn plan_endpoints_are_symmetric(
        roll in -3.1f64..3.1,
        pitch in -1.5f64..1.5,
        yaw in -3.1f64..3.1,
        amplitude_cm in 0.1f64..20.0,
    ) {
        let raw = [250.0, -40.0, 300.0, roll, pitch, yaw];
        let config = MotionConfig::from_ui(amplitude_cm, 50.0, 50.0, Axis::Z);
        let plan = plan(&raw, &config, &MotionLimits::default(), AngleUnit::Radian).unwrap();

        let (lo, hi, c) = (plan.low.position(), plan.high.position(), plan.center.position());
        for i in 0..3 {
            prop_assert!(((lo[i] + hi[i]) / 2.0 - c[i]).abs() < 1e-6);
        }
        prop_assert!((plan.peak_to_peak() - config.amplitude_mm).abs() < 1e-6);
    }
}
