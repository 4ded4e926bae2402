//! 示教运动检测
//!
//! 比较相邻两帧关节角：
//!
//! - `dist`：各关节增量的欧氏范数
//! - `max_abs`：单关节最大增量绝对值
//!
//! 满足 `dist ≥ threshold` 或 `max_abs ≥ 0.6·threshold` 即判定为运动。
//! 首次运动开始录制；静止超过 `idle_timeout` 后停止并保存。

use crate::cancel::CancellationToken;
use crate::config::DetectConfig;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use xarm_link::JointReport;

/// 单关节判据系数
pub const SINGLE_JOINT_FACTOR: f64 = 0.6;

/// 接收上报的最长等待；超时按一次静止 tick 处理
const MAX_RECV_WINDOW: Duration = Duration::from_millis(100);

/// 相邻两帧的 (dist, max_abs)
pub fn joint_deltas(current: &[f64], previous: &[f64]) -> (f64, f64) {
    let mut sum_sq = 0.0;
    let mut max_abs: f64 = 0.0;
    for (a, b) in current.iter().zip(previous) {
        let d = a - b;
        sum_sq += d * d;
        max_abs = max_abs.max(d.abs());
    }
    (sum_sq.sqrt(), max_abs)
}

/// 运动分类器
#[derive(Debug, Clone)]
pub struct MotionClassifier {
    threshold: f64,
    previous: Option<Vec<f64>>,
}

impl MotionClassifier {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
        }
    }

    /// 输入一帧关节角
    ///
    /// 空关节向量返回 `None`（跳过，不影响内部状态）；首帧只作为基准，返回 `Some(false)`。
    pub fn observe(&mut self, angles: &[f64]) -> Option<bool> {
        if angles.is_empty() {
            return None;
        }

        let moved = match &self.previous {
            Some(previous) => {
                let (dist, max_abs) = joint_deltas(angles, previous);
                dist >= self.threshold || max_abs >= SINGLE_JOINT_FACTOR * self.threshold
            },
            None => false,
        };
        self.previous = Some(angles.to_vec());
        Some(moved)
    }

    /// 清除基准帧
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// 检测器对一次 tick 的响应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorAction {
    None,
    StartRecording,
    StopAndSave,
}

/// 录制状态
#[derive(Debug, Clone, Default)]
pub struct RecordingState {
    pub active: bool,
    pub started_at: Option<Instant>,
    pub last_motion_at: Option<Instant>,
    pub trajectory_name: String,
}

impl RecordingState {
    pub fn new(trajectory_name: impl Into<String>) -> Self {
        Self {
            trajectory_name: trajectory_name.into(),
            ..Default::default()
        }
    }

    /// 根据本次 tick 的分类结果决定动作
    pub fn on_tick(&mut self, moved: bool, now: Instant, idle_timeout: Duration) -> DetectorAction {
        if moved {
            self.last_motion_at = Some(now);
            return if self.active {
                DetectorAction::None
            } else {
                DetectorAction::StartRecording
            };
        }

        let idle_expired = self
            .last_motion_at
            .is_some_and(|t| now.saturating_duration_since(t) >= idle_timeout);
        if self.active && idle_expired {
            DetectorAction::StopAndSave
        } else {
            DetectorAction::None
        }
    }

    /// 硬件已开始录制
    pub fn mark_started(&mut self, now: Instant) {
        self.active = true;
        self.started_at = Some(now);
        self.last_motion_at = Some(now);
    }

    /// 结束当前录制（保存或丢弃），返回录制时长
    pub fn finish(&mut self, now: Instant) -> Option<Duration> {
        if !self.active {
            return None;
        }
        let elapsed = self.started_at.map(|t| now.saturating_duration_since(t));
        self.active = false;
        self.started_at = None;
        self.last_motion_at = None;
        elapsed.or(Some(Duration::ZERO))
    }
}

/// 检测线程主循环
///
/// 每帧有效上报或每个空闲接收窗口调用一次 `on_tick(moved, now)`；
/// `on_tick` 返回 `Break`、令牌被取消或上报通道关闭时退出。
pub fn run_loop<F>(
    reports: &Receiver<JointReport>,
    token: &CancellationToken,
    config: &DetectConfig,
    mut on_tick: F,
) where
    F: FnMut(bool, Instant) -> ControlFlow<()>,
{
    let mut classifier = MotionClassifier::new(config.motion_threshold_rad);
    let window = config.idle_timeout().min(MAX_RECV_WINDOW);

    while !token.is_cancelled() {
        let moved = match reports.recv_timeout(window) {
            Ok(report) => match classifier.observe(&report.angles) {
                Some(moved) => moved,
                None => {
                    trace!("skipping report without joint angles");
                    continue;
                },
            },
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("joint report channel closed");
                break;
            },
        };

        if on_tick(moved, Instant::now()).is_break() {
            break;
        }
    }
    debug!("motion detector stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use proptest::prelude::*;

    const TH: f64 = 0.015;

    #[test]
    fn test_first_report_only_primes() {
        let mut c = MotionClassifier::new(TH);
        assert_eq!(c.observe(&[0.0; 6]), Some(false));
        assert_eq!(c.observe(&[1.0; 6]), Some(true));
    }

    #[test]
    fn test_empty_report_skipped() {
        let mut c = MotionClassifier::new(TH);
        c.observe(&[0.0; 6]);
        assert_eq!(c.observe(&[]), None);
        // 基准帧不受空帧影响
        assert_eq!(c.observe(&[0.0; 6]), Some(false));
    }

    #[test]
    fn test_single_joint_jog() {
        let mut c = MotionClassifier::new(TH);
        c.observe(&[0.0; 6]);
        // 0.6·th ≤ 0.0095 < th
        assert_eq!(c.observe(&[0.0095, 0.0, 0.0, 0.0, 0.0, 0.0]), Some(true));
    }

    #[test]
    fn test_sub_threshold_drift() {
        let mut c = MotionClassifier::new(TH);
        c.observe(&[0.0; 6]);
        // max_abs 0.005 < 0.009，dist = 0.005·√6 ≈ 0.0122 < 0.015
        assert_eq!(c.observe(&[0.005; 6]), Some(false));
    }

    #[test]
    fn test_many_small_joints_cross_dist() {
        let mut c = MotionClassifier::new(TH);
        c.observe(&[0.0; 7]);
        // max_abs 0.008 < 0.009，dist = 0.008·√7 ≈ 0.0212 ≥ 0.015
        assert_eq!(c.observe(&[0.008; 7]), Some(true));
    }

    #[test]
    fn test_recording_state_flow() {
        let idle = Duration::from_secs(1);
        let t0 = Instant::now();
        let mut rec = RecordingState::new("memory_loop");

        assert_eq!(rec.on_tick(false, t0, idle), DetectorAction::None);
        assert_eq!(rec.on_tick(true, t0, idle), DetectorAction::StartRecording);
        rec.mark_started(t0);
        assert_eq!(
            rec.on_tick(true, t0 + Duration::from_millis(300), idle),
            DetectorAction::None
        );
        assert_eq!(
            rec.on_tick(false, t0 + Duration::from_millis(900), idle),
            DetectorAction::None
        );
        assert_eq!(
            rec.on_tick(false, t0 + Duration::from_millis(1300), idle),
            DetectorAction::StopAndSave
        );

        assert_eq!(
            rec.finish(t0 + Duration::from_millis(1300)),
            Some(Duration::from_millis(1300))
        );
        assert!(!rec.active);
        assert_eq!(rec.finish(t0), None);
        assert_eq!(
            rec.on_tick(false, t0 + Duration::from_secs(5), idle),
            DetectorAction::None
        );
    }

    #[test]
    fn test_run_loop_idle_ticks_without_reports() {
        let (_tx, rx) = bounded::<JointReport>(4);
        let token = CancellationToken::new();
        let config = DetectConfig {
            idle_timeout_seconds: 0.02,
            ..Default::default()
        };

        let mut ticks = Vec::new();
        run_loop(&rx, &token, &config, |moved, _| {
            ticks.push(moved);
            if ticks.len() >= 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(ticks, vec![false, false, false]);
    }

    #[test]
    fn test_run_loop_classifies_reports() {
        let (tx, rx) = bounded(8);
        for angles in [vec![0.0; 6], vec![], vec![0.1; 6], vec![0.1; 6]] {
            tx.send(JointReport::new(angles)).unwrap();
        }
        drop(tx);

        let mut ticks = Vec::new();
        run_loop(
            &rx,
            &CancellationToken::new(),
            &DetectConfig::default(),
            |moved, _| {
                ticks.push(moved);
                ControlFlow::Continue(())
            },
        );
        // 空帧被跳过，通道关闭后退出
        assert_eq!(ticks, vec![false, true, false]);
    }

    #[test]
    fn test_run_loop_exits_on_cancel() {
        let (_tx, rx) = bounded::<JointReport>(1);
        let token = CancellationToken::new();
        token.cancel();
        let mut called = false;
        run_loop(&rx, &token, &DetectConfig::default(), |_, _| {
            called = true;
            ControlFlow::Continue(())
        });
        assert!(!called);
    }

    proptest! {
        /// 两个判据都未越过时不会判定为运动
        #[test]
        fn below_both_bounds_never_moves(
            deltas in proptest::collection::vec(-0.0089..0.0089f64, 6),
        ) {
            let (dist, max_abs) = joint_deltas(&deltas, &[0.0; 6]);
            prop_assume!(dist < TH && max_abs < SINGLE_JOINT_FACTOR * TH);

            let mut c = MotionClassifier::new(TH);
            c.observe(&[0.0; 6]);
            prop_assert_eq!(c.observe(&deltas), Some(false));
        }

        /// 越过任一判据即判定为运动
        #[test]
        fn crossing_either_bound_moves(
            deltas in proptest::collection::vec(-0.05..0.05f64, 6),
        ) {
            let (dist, max_abs) = joint_deltas(&deltas, &[0.0; 6]);
            prop_assume!(dist >= TH || max_abs >= SINGLE_JOINT_FACTOR * TH);

            let mut c = MotionClassifier::new(TH);
            c.observe(&[0.0; 6]);
            prop_assert_eq!(c.observe(&deltas), Some(true));
        }
    }
}
