//! Behavioural properties of the mapping core, exercised through the public API.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use l1_mapping::{
    BladeInfo, ChassisInfo, ErrorCode, MappingEngine, MappingPolicy, MappingState, PortDescriptor,
    PortId, PortKind, StaticTopology, Topology,
};
use pretty_assertions::assert_eq;

fn id(s: &str) -> PortId {
    s.parse().unwrap()
}

/// Two chassis, the second with a breakout port and a virtual port.
fn lab_topology() -> Topology {
    let mut topology = Topology::single_blade("10.0.0.1", 8);
    topology.chassis.push(ChassisInfo {
        address: "10.0.0.2".to_string(),
        model_name: "Generic L1 Chassis".to_string(),
        serial_number: "CH-2".to_string(),
        blades: vec![
            BladeInfo {
                number: 2,
                model_name: "Generic L1 Module".to_string(),
                serial_number: "BL-2".to_string(),
                ports: vec![
                    PortDescriptor::physical(1),
                    PortDescriptor::physical(2).with_kind(PortKind::Virtual),
                ],
            },
            BladeInfo {
                number: 1,
                model_name: "Generic L1 Module".to_string(),
                serial_number: "BL-1".to_string(),
                ports: vec![PortDescriptor::physical(4).with_breakout(4)],
            },
        ],
    });
    topology
}

fn loaded(policy: MappingPolicy) -> MappingEngine {
    let engine = MappingEngine::new(policy);
    engine
        .autoload(&StaticTopology::new(lab_topology()), None)
        .unwrap();
    engine
}

#[test]
fn test_clear_returns_every_port_to_unmapped() {
    let engine = loaded(MappingPolicy::default());
    engine.map_bidi(&id("10.0.0.1/1/1"), &id("10.0.0.1/1/2")).unwrap();
    engine.map_uni(&id("10.0.0.1/1/3"), &id("10.0.0.1/1/4")).unwrap();
    engine.map_bidi(&id("10.0.0.2/1/04_1"), &id("10.0.0.2/2/01")).unwrap();

    for port in engine.list().unwrap() {
        engine.map_clear(&port.id).unwrap();
        assert_eq!(
            engine.lookup(&port.id).unwrap().state,
            MappingState::Unmapped
        );
    }
    assert!(engine.connections().unwrap().is_empty());
}

#[test]
fn test_clear_of_fan_out_destination_leaves_no_half_state() {
    let engine = loaded(MappingPolicy {
        fan_out: true,
        ..MappingPolicy::default()
    });
    engine
        .map_uni_many(
            &id("10.0.0.1/1/1"),
            &[id("10.0.0.1/1/2"), id("10.0.0.1/1/3")],
        )
        .unwrap();

    engine.map_clear(&id("10.0.0.1/1/2")).unwrap();
    assert_eq!(
        engine.lookup(&id("10.0.0.1/1/2")).unwrap().state,
        MappingState::Unmapped
    );
    assert_eq!(
        engine.lookup(&id("10.0.0.1/1/1")).unwrap().state,
        MappingState::SourceOf(vec![id("10.0.0.1/1/3")])
    );

    // Every remaining connection endpoint agrees with the port states.
    for conn in engine.connections().unwrap() {
        assert_eq!(
            engine.lookup(&conn.destination).unwrap().state,
            MappingState::DestinationOf(conn.source.clone())
        );
    }
}

#[test]
fn test_bidi_then_clear_round_trip() {
    let engine = loaded(MappingPolicy::default());
    let a = id("10.0.0.1/1/5");
    let b = id("10.0.0.1/1/6");

    engine.map_bidi(&a, &b).unwrap();
    assert_eq!(engine.lookup(&a).unwrap().state, MappingState::BidiWith(b.clone()));
    assert_eq!(engine.lookup(&b).unwrap().state, MappingState::BidiWith(a.clone()));

    let removed = engine.map_clear(&a).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(engine.lookup(&a).unwrap().state, MappingState::Unmapped);
    assert_eq!(engine.lookup(&b).unwrap().state, MappingState::Unmapped);
}

#[test]
fn test_bidi_onto_busy_port_is_atomic() {
    let engine = loaded(MappingPolicy::default());
    let a = id("10.0.0.1/1/1");
    let b = id("10.0.0.1/1/2");
    let c = id("10.0.0.1/1/3");
    engine.map_bidi(&b, &c).unwrap();

    let err = engine.map_bidi(&a, &b).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PortBusy);
    assert_eq!(err.port(), Some(&b));
    assert_eq!(engine.lookup(&a).unwrap().state, MappingState::Unmapped);
    assert_eq!(engine.lookup(&b).unwrap().state, MappingState::BidiWith(c));
}

#[test]
fn test_clear_to_twice_reports_missing_mapping() {
    let engine = loaded(MappingPolicy::default());
    let a = id("10.0.0.2/1/04_2");
    let b = id("10.0.0.2/1/04_3");

    engine.map_uni(&a, &b).unwrap();
    let removed = engine.map_clear_to(&a, &b).unwrap();
    assert_eq!((removed.source, removed.destination), (a.clone(), b.clone()));

    let err = engine.map_clear_to(&a, &b).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MappingNotFound);
    assert_eq!(err.port(), Some(&b));
}

#[test]
fn test_autoload_then_list_matches_topology() {
    let engine = loaded(MappingPolicy::default());
    let listed: Vec<String> = engine
        .list()
        .unwrap()
        .iter()
        .map(|p| p.id.to_string())
        .collect();

    let mut expected: Vec<String> = (1..=8).map(|n| format!("10.0.0.1/1/{:02}", n)).collect();
    expected.extend(
        [
            "10.0.0.2/1/04_1",
            "10.0.0.2/1/04_2",
            "10.0.0.2/1/04_3",
            "10.0.0.2/1/04_4",
            "10.0.0.2/2/01",
            "10.0.0.2/2/02",
        ]
        .map(String::from),
    );
    assert_eq!(listed, expected);

    let from_topology: Vec<PortId> = lab_topology()
        .ports()
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    let from_list: Vec<PortId> = engine.list().unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(from_list, from_topology);

    let virt = engine.lookup(&id("10.0.0.2/2/02")).unwrap();
    assert_eq!(virt.kind, PortKind::Virtual);
}

#[test]
fn test_autoload_is_idempotent_and_preserves_connections() {
    let engine = loaded(MappingPolicy::default());
    engine.map_bidi(&id("10.0.0.1/1/1"), &id("10.0.0.2/2/01")).unwrap();

    let report = engine
        .autoload(&StaticTopology::new(lab_topology()), None)
        .unwrap();
    assert!(report.plan.is_unchanged());
    assert_eq!(report.ports.len(), 14);
    assert_eq!(engine.connections().unwrap().len(), 1);

    let mapped = report
        .ports
        .iter()
        .find(|p| p.id == id("10.0.0.1/1/1"))
        .unwrap();
    assert_eq!(mapped.state, MappingState::BidiWith(id("10.0.0.2/2/01")));
}

#[test]
fn test_concurrent_overlapping_bidi_exactly_one_wins() {
    for _ in 0..50 {
        let engine = Arc::new(loaded(MappingPolicy::default()));
        let barrier = Arc::new(Barrier::new(2));

        let spawn = |x: &str, y: &str| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let (x, y) = (id(x), id(y));
            thread::spawn(move || {
                barrier.wait();
                engine.map_bidi(&x, &y)
            })
        };
        let first = spawn("10.0.0.1/1/1", "10.0.0.1/1/2");
        let second = spawn("10.0.0.1/1/2", "10.0.0.1/1/3");

        let results = [first.join().unwrap(), second.join().unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);

        let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(err.code(), ErrorCode::PortBusy);
        assert_eq!(err.port(), Some(&id("10.0.0.1/1/2")));
        assert_eq!(engine.connections().unwrap().len(), 1);
    }
}

#[test]
fn test_concurrent_readers_do_not_time_out() {
    let engine = Arc::new(loaded(MappingPolicy {
        lock_timeout: Duration::from_secs(2),
        ..MappingPolicy::default()
    }));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    assert_eq!(engine.list().unwrap().len(), 14);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(engine.stats().timeouts, 0);
}
