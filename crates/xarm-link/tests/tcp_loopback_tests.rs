//! TcpLink 回环测试
//!
//! 在本机启动一个最小化的模拟控制器（私有 Modbus-TCP 服务端），
//! 验证 TcpLink 的帧编解码、阻塞运动轮询、轨迹保存流程与上报转发。

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use xarm_link::{LinkError, Pose, RobotLink, TcpLink, TcpLinkConfig};
use xarm_protocol::{
    ControllerMode, FRAME_HEADER_LEN, Register, ResponseFrame, StatusByte, f32s_to_bytes_le,
};

type Requests = Arc<Mutex<Vec<(Register, Vec<u8>)>>>;

/// 模拟控制器：每个请求交给 handler 生成 (状态字节, 载荷)
fn spawn_controller<F>(mut handler: F) -> (u16, Requests)
where
    F: FnMut(Register, &[u8]) -> (u8, Vec<u8>) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        loop {
            let mut header = [0u8; FRAME_HEADER_LEN];
            if stream.read_exact(&mut header).is_err() {
                break;
            }
            let tid = u16::from_be_bytes([header[0], header[1]]);
            let len = u16::from_be_bytes([header[4], header[5]]) as usize;
            let mut body = vec![0u8; len];
            if stream.read_exact(&mut body).is_err() {
                break;
            }

            let register = Register::from_byte(body[0]).unwrap();
            let params = body[1..].to_vec();
            log.lock().unwrap().push((register, params.clone()));

            let (status, payload) = handler(register, &params);
            let response = ResponseFrame {
                transaction_id: tid,
                register,
                status: StatusByte::from_byte(status),
                payload: payload.into(),
            };
            if stream.write_all(&response.encode()).is_err() {
                break;
            }
        }
    });

    (port, requests)
}

fn fast_config(control_port: u16) -> TcpLinkConfig {
    TcpLinkConfig {
        control_port,
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(1),
        motion_timeout: Duration::from_secs(2),
        motion_settle: Duration::from_millis(5),
        poll_interval: Duration::from_millis(5),
        trajectory_io_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

fn registers(requests: &Requests) -> Vec<Register> {
    requests.lock().unwrap().iter().map(|(r, _)| *r).collect()
}

#[test]
fn test_read_pose_decodes_floats() {
    let (port, _) = spawn_controller(|register, _| match register {
        Register::GetTcpPose => (0, f32s_to_bytes_le(&[300.0, 10.0, 200.0, 3.0, 0.0, 0.5])),
        _ => (0, Vec::new()),
    });
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    let pose = link.read_pose().unwrap();
    assert_eq!(pose, vec![300.0, 10.0, 200.0, 3.0, 0.0, 0.5]);
}

#[test]
fn test_set_mode_sends_mode_byte() {
    let (port, requests) = spawn_controller(|_, _| (0, Vec::new()));
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    link.set_mode(ControllerMode::Teach).unwrap();

    let log = requests.lock().unwrap();
    assert_eq!(log[0], (Register::SetMode, vec![2]));
}

#[test]
fn test_setting_command_ignores_standing_error_bit() {
    // 非运动指令的错误位只反映控制器既有状态
    let (port, _) = spawn_controller(|_, _| (0x40, Vec::new()));
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    assert!(link.set_collision_sensitivity(3).is_ok());
}

#[test]
fn test_move_pose_error_bit_is_controller_error() {
    let (port, _) = spawn_controller(|register, _| match register {
        Register::MoveLine => (0x40, Vec::new()),
        _ => (0, Vec::new()),
    });
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    let err = link
        .move_pose(&Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0), 100.0, None, true)
        .unwrap_err();
    assert_eq!(err.controller_code(), Some(1));
}

#[test]
fn test_move_pose_waits_until_idle() {
    let mut moving_polls = 3;
    let (port, requests) = spawn_controller(move |register, _| match register {
        Register::GetState => {
            if moving_polls > 0 {
                moving_polls -= 1;
                (0, vec![1]) // Moving
            } else {
                (0, vec![2])
            }
        },
        Register::GetCommandCount => (0, vec![0, 0]),
        _ => (0, Vec::new()),
    });
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    link.move_pose(
        &Pose::new(300.0, 0.0, 150.0, 3.0, 0.0, 0.0),
        200.0,
        Some(1000.0),
        true,
    )
    .unwrap();

    let seen = registers(&requests);
    assert_eq!(seen[0], Register::MoveLine);
    let state_polls = seen.iter().filter(|r| **r == Register::GetState).count();
    assert!(state_polls >= 4, "polled state {} times", state_polls);
}

#[test]
fn test_move_pose_stopped_state_fails() {
    let (port, _) = spawn_controller(|register, _| match register {
        Register::GetState => (0, vec![4]),
        _ => (0, Vec::new()),
    });
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    let result = link.move_pose(&Pose::default(), 100.0, None, true);
    assert!(matches!(result, Err(LinkError::Controller { .. })));
}

#[test]
fn test_stop_recording_saves_and_waits_for_status() {
    let mut status_polls = 0;
    let (port, requests) = spawn_controller(move |register, _| match register {
        Register::GetTrajectoryStatus => {
            status_polls += 1;
            if status_polls < 3 {
                (0, vec![4]) // Saving
            } else {
                (0, vec![5]) // SaveSuccess
            }
        },
        _ => (0, Vec::new()),
    });
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    link.stop_recording(Some("memory_loop")).unwrap();

    let log = requests.lock().unwrap();
    assert_eq!(log[0], (Register::SetTrajectoryRecord, vec![0]));
    assert_eq!(log[1].0, Register::SaveTrajectory);
    assert_eq!(&log[1].1[..11], b"memory_loop");
    assert_eq!(log[1].1.len(), 81);
}

#[test]
fn test_stop_recording_discard_skips_save() {
    let (port, requests) = spawn_controller(|_, _| (0, Vec::new()));
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    link.stop_recording(None).unwrap();

    assert_eq!(registers(&requests), vec![Register::SetTrajectoryRecord]);
}

#[test]
fn test_load_trajectory_failure_status() {
    let (port, _) = spawn_controller(|register, _| match register {
        Register::GetTrajectoryStatus => (0, vec![3]), // LoadFailed
        _ => (0, Vec::new()),
    });
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    let err = link.load_trajectory("missing").unwrap_err();
    assert_eq!(err.controller_code(), Some(3));
}

#[test]
fn test_query_error_warn_and_version() {
    let (port, _) = spawn_controller(|register, _| match register {
        Register::GetErrorWarn => (0x40, vec![22, 0]),
        Register::GetVersion => {
            let mut payload = b"v2.4.0".to_vec();
            payload.resize(40, 0);
            (0, payload)
        },
        _ => (0, Vec::new()),
    });
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    let codes = link.query_error_warn().unwrap();
    assert_eq!(codes.error, 22);
    assert_eq!(codes.warn, 0);
    assert_eq!(link.query_firmware_version().unwrap(), "v2.4.0");
}

#[test]
fn test_disconnect_then_not_connected() {
    let (port, _) = spawn_controller(|_, _| (0, Vec::new()));
    let link = TcpLink::connect("127.0.0.1", fast_config(port)).unwrap();

    link.disconnect().unwrap();
    assert!(matches!(link.clear_error(), Err(LinkError::NotConnected)));
}

fn report_frame(angles: [f32; 7]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&87u32.to_be_bytes());
    buf.push(0x20);
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend(f32s_to_bytes_le(&angles));
    buf.extend(f32s_to_bytes_le(&[300.0, 0.0, 200.0, 3.0, 0.0, 0.0]));
    buf.extend(f32s_to_bytes_le(&[0.0; 7]));
    buf
}

#[test]
fn test_joint_reports_are_forwarded() {
    let (control_port, _) = spawn_controller(|_, _| (0, Vec::new()));

    let report_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let report_port = report_listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (mut stream, _): (TcpStream, _) = report_listener.accept().unwrap();
        // 一帧拆成两段发送，验证半帧缓冲
        let frame = report_frame([0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.0]);
        stream.write_all(&frame[..20]).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
        stream.write_all(&frame[20..]).unwrap();
        stream
            .write_all(&report_frame([0.2, 0.2, 0.3, 0.4, 0.5, 0.6, 0.0]))
            .unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    let config = TcpLinkConfig {
        report_port,
        ..fast_config(control_port)
    };
    let link = TcpLink::connect("127.0.0.1", config).unwrap();
    let rx = link.subscribe_joint_reports().unwrap();

    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.angles.len(), 7);
    assert!((first.angles[0] - 0.1).abs() < 1e-6);

    let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!((second.angles[0] - 0.2).abs() < 1e-6);

    link.unsubscribe_joint_reports().unwrap();
}
