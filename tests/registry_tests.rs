use simtemp::registry::MAX_DEVICES;
use simtemp::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn attach_manual(registry: &DeviceRegistry) -> u32 {
    registry
        .attach_with(&InitialConfig::default(), Trigger::Manual)
        .unwrap()
}

#[test]
fn test_ids_are_lowest_free() {
    let registry = DeviceRegistry::new();
    assert_eq!(attach_manual(&registry), 0);
    assert_eq!(attach_manual(&registry), 1);
    assert_eq!(attach_manual(&registry), 2);

    registry.detach(1).unwrap();
    assert_eq!(registry.ids().as_slice(), &[0, 2]);

    // Freed id is handed out again
    assert_eq!(attach_manual(&registry), 1);
    assert_eq!(registry.get(1).unwrap().name(), "simtemp1");
    registry.shutdown_all();
}

#[test]
fn test_lookup_after_detach() {
    let registry = DeviceRegistry::new();
    let id = attach_manual(&registry);
    let device = registry.get(id).unwrap();

    registry.detach(id).unwrap();

    assert!(matches!(registry.get(id), Err(DeviceError::NotFound(0))));
    assert!(matches!(registry.detach(id), Err(DeviceError::NotFound(0))));

    // Holders of an old handle see a closed device
    assert!(device.is_closed());
    assert!(matches!(device.read(false), Err(DeviceError::Closed)));
}

#[test]
fn test_detach_wakes_blocked_reader() {
    let registry = DeviceRegistry::new();
    let id = attach_manual(&registry);
    let device = registry.get(id).unwrap();

    let reader = thread::spawn(move || device.read(true));
    thread::sleep(Duration::from_millis(50));

    registry.detach(id).unwrap();
    assert!(matches!(reader.join().unwrap(), Err(DeviceError::Closed)));
}

#[test]
fn test_registry_full() {
    let registry = DeviceRegistry::new();
    for _ in 0..MAX_DEVICES {
        attach_manual(&registry);
    }
    assert!(matches!(
        registry.attach_with(&InitialConfig::default(), Trigger::Manual),
        Err(DeviceError::NoSpace)
    ));
    assert_eq!(registry.len(), MAX_DEVICES);

    registry.shutdown_all();
    assert!(registry.is_empty());
}

#[test]
fn test_devices_are_independent() {
    let registry = Arc::new(DeviceRegistry::new());
    let a = registry.get(attach_manual(&registry)).unwrap();
    let b = registry.get(attach_manual(&registry)).unwrap();

    a.set_threshold_mc(i32::MIN);
    a.trigger().unwrap();
    a.set_mode("bogus").unwrap_err();

    assert_eq!(a.stats().updates, 1);
    assert_eq!(a.stats().errors, 1);
    assert_eq!(b.stats(), StatsSnapshot::default());
    assert_eq!(b.threshold_mc(), 45_000);
    assert!(matches!(b.read(false), Err(DeviceError::WouldBlock)));

    registry.shutdown_all();
}
