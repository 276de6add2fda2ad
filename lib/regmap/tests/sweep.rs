use regmap::{
    Command, Device, DeviceOptions, EnableState, LocalVariableOptions, MemoryEmulator, Mode,
    ModeFilter, NodeHandle, RegError, RemoteVariableOptions, ResetKind, Root, TransactionKind,
    Transport, Value, Variable,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn emulated_root() -> (Arc<MemoryEmulator>, Root) {
    init_logger();
    let emu = Arc::new(MemoryEmulator::new(4, 64));
    let transport: Arc<dyn Transport> = emu.clone();
    (emu, Root::new("top", "test tree", Some(transport)))
}

fn device(name: &str, offset: u64, enabled: bool) -> NodeHandle {
    let dev = Device::create(
        name,
        DeviceOptions {
            offset,
            enabled,
            ..Default::default()
        },
    );
    dev.add(Variable::remote("reg", RemoteVariableOptions::at(0, 32)))
        .unwrap();
    dev
}

#[test]
fn disabled_device_suppresses_its_subtree() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    let b = device("b", 0x2000, false);
    let c = device("c", 0x0100, true);
    b.add(c.clone()).unwrap();
    a.add(b.clone()).unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    emu.clear_log();

    assert_eq!(c.enable_state(), EnableState::ParentSuppressed);
    assert_eq!(
        c.node("enable").unwrap().get(true).unwrap(),
        Value::from(EnableState::PARENT_DISP)
    );

    root.write_all().unwrap();
    let addresses: Vec<u64> = emu.transactions().iter().map(|t| t.address).collect();
    assert_eq!(addresses, vec![0x1000]);

    b.node("enable").unwrap().set(true, false).unwrap();
    assert_eq!(c.enable_state(), EnableState::True);
    emu.clear_log();
    root.write_all().unwrap();
    let addresses: Vec<u64> = emu.transactions().iter().map(|t| t.address).collect();
    assert_eq!(addresses, vec![0x1000, 0x3000, 0x3100]);
}

#[test]
fn parent_sentinel_cannot_be_stored() {
    let (_emu, root) = emulated_root();
    let a = device("a", 0, true);
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    let enable = a.node("enable").unwrap();
    enable.set(EnableState::PARENT_DISP, false).unwrap();
    assert_eq!(enable.value().unwrap(), Value::Bool(true));
    assert!(matches!(
        enable.set("maybe", false),
        Err(RegError::InvalidValue { .. })
    ));
}

#[test]
fn enable_change_notifies_child_enables() {
    let (_emu, root) = emulated_root();
    let a = device("a", 0, true);
    let b = device("b", 0x100, true);
    a.add(b.clone()).unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();

    let seen = Arc::new(Mutex::new(vec![]));
    let sink = seen.clone();
    b.node("enable")
        .unwrap()
        .as_variable()
        .unwrap()
        .add_listener(move |path, value| {
            sink.lock().unwrap().push((path.to_string(), value.clone()));
        });
    a.set_enable(false);
    a.set_enable(true);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("top.a.b.enable".to_string(), Value::from(EnableState::PARENT_DISP)),
            ("top.a.b.enable".to_string(), Value::Bool(true)),
        ]
    );
}

#[test]
fn unforced_write_only_touches_stale_blocks() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    a.add(Variable::remote("other", RemoteVariableOptions::at(4, 32)))
        .unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    root.write_all().unwrap();
    emu.clear_log();

    a.node("other").unwrap().set(9u64, false).unwrap();
    root.write_blocks(false, true, None).unwrap();
    root.check_blocks(true, None).unwrap();
    let log = emu.transactions();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].address, 0x1004);
    assert_eq!(emu.peek(0x1004, 4), vec![9, 0, 0, 0]);
    assert!(a.blocks().iter().all(|b| !b.stale()));
}

#[test]
fn targeted_sweep_touches_one_block() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    let other = Variable::remote("other", RemoteVariableOptions::at(8, 32));
    a.add(other.clone()).unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    emu.clear_log();

    a.read_blocks(true, Some(&other)).unwrap();
    a.check_blocks(true, Some(&other)).unwrap();
    let log = emu.transactions();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].address, log[0].kind), (0x1008, TransactionKind::Read));
}

#[test]
fn read_all_refreshes_cached_values() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    emu.poke(0x1000, &[0x78, 0x56, 0x34, 0x12]);
    root.read_all().unwrap();
    assert_eq!(
        a.node("reg").unwrap().value().unwrap(),
        Value::UInt(0x1234_5678)
    );
}

#[test]
fn verify_detects_changed_memory() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    let status = Variable::remote(
        "status",
        RemoteVariableOptions {
            mode: Mode::ReadOnly,
            ..RemoteVariableOptions::at(4, 32)
        },
    );
    a.add(status).unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    a.node("reg").unwrap().set(0x55u64, false).unwrap();
    root.write_all().unwrap();
    root.verify_all().unwrap();

    // Read-only content is not verified.
    emu.poke(0x1004, &[0xff]);
    root.verify_all().unwrap();

    emu.poke(0x1001, &[0x01]);
    assert_eq!(
        root.verify_all(),
        Err(RegError::VerifyMismatch {
            path: "top.a".into(),
            address: 0x1001,
        })
    );
}

#[test]
fn sweep_error_carries_device_and_code() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    emu.inject_fault(0x1000..0x1004, 7);
    assert_eq!(
        root.write_all(),
        Err(RegError::MemoryAccess {
            path: "top.a".into(),
            address: 0x1000,
            code: 7,
        })
    );
}

#[test]
fn fault_on_second_block_is_reported_there_and_stays_stale() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    let ctl = Variable::remote("ctl", RemoteVariableOptions::at(4, 32));
    a.add(ctl.clone()).unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();

    a.node("reg").unwrap().set(0x1122_3344u64, false).unwrap();
    ctl.set(0x5566_7788u64, false).unwrap();
    emu.inject_fault(0x1004..0x1008, 9);
    assert_eq!(
        root.write_all(),
        Err(RegError::MemoryAccess {
            path: "top.a".into(),
            address: 0x1004,
            code: 9,
        })
    );
    let block_at = |offset: u64| {
        a.blocks()
            .into_iter()
            .find(|b| b.offset() == offset)
            .unwrap()
    };
    assert!(!block_at(0).stale());
    assert!(block_at(4).stale());
    assert_eq!(emu.peek(0x1000, 4), vec![0x44, 0x33, 0x22, 0x11]);
    assert_eq!(emu.peek(0x1004, 4), vec![0; 4]);

    // Nothing is left pending that could later pass as a completed write.
    a.check_blocks(true, None).unwrap();
    assert!(block_at(4).stale());

    emu.clear_faults();
    a.write_blocks(false, true, None).unwrap();
    a.check_blocks(true, None).unwrap();
    assert!(!block_at(4).stale());
    assert_eq!(emu.peek(0x1004, 4), vec![0x88, 0x77, 0x66, 0x55]);
}

#[test]
fn raw_access_between_submit_and_check_keeps_block_error() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    let ctl = Variable::remote("ctl", RemoteVariableOptions::at(4, 32));
    a.add(ctl).unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();

    emu.inject_fault(0x1004..0x1008, 3);
    a.write_blocks(true, true, None).unwrap();
    assert_eq!(a.raw_read_word(0).unwrap(), 0);
    assert_eq!(
        a.check_blocks(true, None),
        Err(RegError::MemoryAccess {
            path: "top.a".into(),
            address: 0x1004,
            code: 3,
        })
    );
}

#[test]
fn sweeps_need_a_started_tree() {
    let (_emu, root) = emulated_root();
    assert!(matches!(
        root.write_all(),
        Err(RegError::NotAttached { .. })
    ));
}

#[test]
fn timeout_reaches_blocks_and_transport() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    assert_eq!(emu.timeout_us(), config::DEFAULT_TIMEOUT_US);

    root.set_timeout(0.25).unwrap();
    assert_eq!(emu.timeout_us(), 250_000);
    assert!(a.blocks().iter().all(|b| b.timeout_us() == 250_000));
    assert_eq!(a.as_device().unwrap().timeout_us(), 250_000);
}

#[test]
fn reset_runs_hooks_top_down() {
    let (_emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    root.add(a.clone()).unwrap();
    let calls = Arc::new(Mutex::new(vec![]));
    for dev in [root.as_handle().clone(), a.clone()] {
        let calls = calls.clone();
        dev.set_reset_hook(move |node, kind| {
            calls.lock().unwrap().push((node.path(), kind));
        })
        .unwrap();
    }
    root.dev_reset(ResetKind::Soft).unwrap();
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            ("top".to_string(), ResetKind::Soft),
            ("top.a".to_string(), ResetKind::Soft),
        ]
    );
}

#[test]
fn snapshot_and_restore_round_trip() {
    let (emu, root) = emulated_root();
    let a = device("a", 0x1000, true);
    let label = Variable::local(
        "label",
        LocalVariableOptions {
            value: Value::from("dut"),
            ..Default::default()
        },
    );
    let status = Variable::remote(
        "status",
        RemoteVariableOptions {
            mode: Mode::ReadOnly,
            ..RemoteVariableOptions::at(4, 8)
        },
    );
    let pulses = Arc::new(Mutex::new(vec![]));
    let sink = pulses.clone();
    let pulse = Command::create("pulse", "", move |dev, arg| {
        sink.lock().unwrap().push((dev.path(), arg));
    });
    a.add_nodes([label.clone(), status, pulse]).unwrap();
    root.add(a.clone()).unwrap();
    root.start().unwrap();
    a.node("reg").unwrap().set(42u64, false).unwrap();

    let rw = root.snapshot(ModeFilter::RW).unwrap();
    assert_eq!(
        rw,
        json!({
            "enable": true,
            "a": { "enable": true, "reg": 42, "label": "dut" }
        })
    );
    let all = root.snapshot(ModeFilter::all()).unwrap();
    assert_eq!(all["a"]["status"], json!(0));

    let restore = json!({
        "a": { "reg": 7, "label": "bench", "pulse": 3, "unknown": 1, "status": 9 }
    });
    emu.clear_log();
    root.restore(&restore, true, ModeFilter::RW).unwrap();
    assert_eq!(a.node("reg").unwrap().value().unwrap(), Value::UInt(7));
    assert_eq!(label.value().unwrap(), Value::from("bench"));
    assert_eq!(
        a.node("status").unwrap().value().unwrap(),
        Value::UInt(0)
    );
    assert_eq!(
        *pulses.lock().unwrap(),
        vec![("top.a".to_string(), Some(Value::UInt(3)))]
    );
    assert_eq!(emu.peek(0x1000, 4), vec![7, 0, 0, 0]);
}
