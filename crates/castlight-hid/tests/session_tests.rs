//! End-to-end sessions against the simulated bus.

use assert_matches::assert_matches;
use castlight_core::{DeviceIdentity, IdentityTable, PACKET_SIZE, PacketBuffer};
use castlight_hid::sim::{SimBus, SimDevice, SimEvent};
use castlight_hid::{
    HidError, LocatorError, SendOptions, Transport, TransportError, open_device, send_packets,
    update_lights,
};

fn scenario_table() -> IdentityTable {
    IdentityTable::from_identities(&[
        DeviceIdentity::new(0x0951, 0x171f),
        DeviceIdentity::new(0x03f0, 0x0f8b),
    ])
}

/// Header, size, two data packets, footer.
fn five_packets() -> PacketBuffer {
    let mut header = [0u8; PACKET_SIZE];
    header[0] = 0x04;
    header[1] = 0xf2;
    header[8] = 0x01;

    let mut size = [0u8; PACKET_SIZE];
    size[0] = 0x05;
    size[1] = 0x02;

    let mut data = [0u8; PACKET_SIZE];
    data[0] = 0x81;
    data[1..4].copy_from_slice(&[0xff, 0x00, 0x00]);
    let mut data2 = data;
    data2[0] = 0x82;

    let mut footer = [0u8; PACKET_SIZE];
    footer[0] = 0x06;

    PacketBuffer::from_packets(vec![header, size, data, data2, footer]).unwrap()
}

fn exchanges(device: &SimDevice) -> Vec<SimEvent> {
    device
        .events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::Control { .. } | SimEvent::Interrupt { .. }))
        .collect()
}

#[test]
fn test_end_to_end_success() {
    let device = SimDevice::new(DeviceIdentity::new(0x03f0, 0x0f8b));
    let bus = SimBus::new(vec![device.clone()]);

    let handle = open_device(&bus, &scenario_table()).unwrap();
    assert_eq!(handle.identity(), DeviceIdentity::new(0x03f0, 0x0f8b));

    send_packets(&handle, &five_packets(), 5, true).unwrap();
    assert_eq!(device.control_count(), 5);
    assert_eq!(device.interrupt_count(), 5);
    assert_eq!(exchanges(&device).len(), 10);

    drop(handle);
    assert!(!device.is_claimed());
}

#[test]
fn test_end_to_end_second_data_packet_rejected() {
    // Transfer 3 is the second data packet
    let device = SimDevice::new(DeviceIdentity::new(0x03f0, 0x0f8b)).ack_status(3, 0xee);
    let bus = SimBus::new(vec![device.clone()]);

    let handle = open_device(&bus, &scenario_table()).unwrap();
    let err = send_packets(&handle, &five_packets(), 5, false).unwrap_err();

    assert_matches!(err, TransportError::DataPacketError { index: 3, status: 0xee });
    assert_eq!(device.control_count(), 4);
    assert_eq!(device.interrupt_count(), 4);

    drop(handle);
    assert!(!device.is_claimed());
    let releases = device.events().iter().filter(|e| matches!(e, SimEvent::Release(_))).count();
    assert_eq!(releases, 2);
}

#[test]
fn test_footer_rejected_is_last_transfer() {
    let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).ack_status(4, 0x00);
    let bus = SimBus::new(vec![device.clone()]);

    let handle = open_device(&bus, &scenario_table()).unwrap();
    let err = send_packets(&handle, &five_packets(), 5, false).unwrap_err();

    assert_matches!(err, TransportError::FooterError { index: 4, status: 0x00 });
    assert_matches!(exchanges(&device).last(), Some(SimEvent::Interrupt { .. }));
    assert_eq!(device.control_count(), 5);
}

#[test]
fn test_two_sessions_are_independent() {
    let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f));
    let bus = SimBus::new(vec![device.clone()]);
    let table = scenario_table();
    let packets = five_packets();

    for _ in 0..2 {
        let handle = open_device(&bus, &table).unwrap();
        send_packets(&handle, &packets, packets.len(), false).unwrap();
    }

    assert_eq!(device.control_count(), 10);
    let sent = device.sent_packets();
    assert_eq!(sent[..5], sent[5..]);
}

#[test]
fn test_update_lights_busy_device() {
    let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).held_elsewhere();
    let bus = SimBus::new(vec![device.clone()]);

    let result = update_lights(
        &bus,
        &scenario_table(),
        &Transport::default(),
        &five_packets(),
        &SendOptions::default(),
    );

    assert_matches!(result, Err(HidError::Locator(LocatorError::DeviceBusy { .. })));
    assert_eq!(device.control_count(), 0);
}

#[test]
fn test_update_lights_success_releases_device() {
    let device = SimDevice::new(DeviceIdentity::new(0x03f0, 0x0f8b));
    let bus = SimBus::new(vec![device.clone()]);

    let report = update_lights(
        &bus,
        &scenario_table(),
        &Transport::default(),
        &five_packets(),
        &SendOptions::default(),
    )
    .unwrap();

    assert_eq!(report.packets_sent, 5);
    assert_eq!(report.data_packets, 2);
    assert!(!device.is_claimed());
}
