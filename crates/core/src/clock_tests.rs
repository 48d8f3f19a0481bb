use super::*;

#[test]
fn fake_clock_advances_both_instant_and_epoch() {
    let clock = FakeClock::new();
    let start = clock.now();
    let start_epoch = clock.epoch_ms();

    clock.advance(Duration::from_millis(250));

    assert_eq!(clock.now(), start + Duration::from_millis(250));
    assert_eq!(clock.epoch_ms(), start_epoch + 250);
}

#[test]
fn set_epoch_ms_is_independent_of_instant() {
    let clock = FakeClock::new();
    let before = clock.now();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
    assert_eq!(clock.now(), before);
}

#[test]
fn system_clock_epoch_is_plausible() {
    let clock = SystemClock;
    // Sanity bound: anything after 2021-01-01 in epoch ms.
    assert!(clock.epoch_ms() > 1_600_000_000_000);
}
