//! Multi-module scenarios that don't belong to any single unit: a line
//! arriving end-to-end through frame → message → entity update, and a
//! full bind handshake reaching `BOUND`.

use std::sync::Arc;
use std::time::Duration;

use ramses_rf::bind_state::Context;
use ramses_rf::clock::SystemClock;
use ramses_rf::{DeviceId, EntityRegistry, Message};

#[test]
fn line_flows_through_frame_message_and_entity_update() {
    let clock = SystemClock;
    let line = "053  I 000 01:158182 --:------ 01:158182 30C9 006 0007D1010864";

    let message = Message::from_line(line, &clock).expect("valid line decodes");
    assert_eq!(message.payload.as_array().unwrap().len(), 2);

    let mut registry = EntityRegistry::new();
    registry.apply(&message, false).expect("message applies cleanly");

    let controller: DeviceId = "01:158182".parse().unwrap();
    assert_eq!(registry.main_controller(), Some(controller));
    assert!(registry.device(controller).is_some());
    assert!(registry.zone("00").is_some());
    assert!(registry.zone("01").is_some());
}

#[test]
fn bind_handshake_reaches_bound_within_confirm_timeout() {
    let supplicant_id: DeviceId = "04:111111".parse().unwrap();
    let respondent_id: DeviceId = "01:222222".parse().unwrap();
    let clock = Arc::new(SystemClock);

    let mut supplicant = Context::supplicant(supplicant_id, clock.clone(), 3, 300);
    let mut respondent = Context::respondent(respondent_id, clock, 3, 300);

    supplicant.sent_offer().unwrap();
    supplicant.rcvd_offer(supplicant_id).unwrap();
    respondent.rcvd_offer(supplicant_id).unwrap();

    respondent.sent_accept().unwrap();
    respondent.rcvd_accept(respondent_id).unwrap();
    supplicant.rcvd_accept(respondent_id).unwrap();

    supplicant.sent_confirm().unwrap();
    supplicant.rcvd_confirm(supplicant_id).unwrap();
    respondent.rcvd_confirm(supplicant_id).unwrap();

    respondent.poll_timeout(Duration::from_secs(3));
    assert_eq!(respondent.state(), ramses_rf::bind_state::State::Bound);

    supplicant.sent_confirm().unwrap();
    supplicant.sent_confirm().unwrap();
    assert_eq!(supplicant.state(), ramses_rf::bind_state::State::Bound);
}
