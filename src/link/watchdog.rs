//! # Event Watchdog
//!
//! Turns the stream of `State` packets into debounced flight events.
//!
//! Evaluation order for each state:
//! 1. `UpsideDown` and `LowBattery`, each on its own.
//! 2. The flight-mode group (`Ready`, `Flying`, `Landing`, `Crash`). The current
//!    mode selects at most one of them.
//! 3. Only when no mode event fired: the pending `Takeoff` token, then the
//!    pending `EmergencyStop` token.
//!
//! A condition is only evaluated when a callback is registered for it, so an
//! unobserved condition never consumes its timer or token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::timer::Timer;
use super::{lock, read, write};
use crate::config::EventsConfig;
use crate::packet::payload::State;
use crate::packet::protocol::{ModeFlight, SensorOrientation};

/// Events raised from state telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    UpsideDown,
    LowBattery,
    Ready,
    Flying,
    Landing,
    Crash,
    Takeoff,
    EmergencyStop,
}

impl Event {
    pub const ALL: [Event; 8] = [
        Event::UpsideDown,
        Event::LowBattery,
        Event::Ready,
        Event::Flying,
        Event::Landing,
        Event::Crash,
        Event::Takeoff,
        Event::EmergencyStop,
    ];

    /// Mode event for a flight mode, if it has one
    fn for_mode(mode: ModeFlight) -> Option<Event> {
        match mode {
            ModeFlight::Ready => Some(Event::Ready),
            ModeFlight::Flight => Some(Event::Flying),
            ModeFlight::Landing => Some(Event::Landing),
            ModeFlight::Accident => Some(Event::Crash),
            _ => None,
        }
    }
}

pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

pub struct Watchdog {
    low_battery_percent: u8,
    timers: Mutex<HashMap<Event, Timer>>,
    handlers: RwLock<HashMap<Event, EventCallback>>,
    takeoff_pending: AtomicBool,
    stop_pending: AtomicBool,
}

impl Watchdog {
    pub fn new(config: &EventsConfig) -> Self {
        let ms = Duration::from_millis;
        let timers = HashMap::from([
            (Event::UpsideDown, Timer::new(ms(config.upside_down_interval_ms))),
            (Event::LowBattery, Timer::new(ms(config.low_battery_interval_ms))),
            (Event::Ready, Timer::new(ms(config.ready_interval_ms))),
            (Event::Flying, Timer::new(ms(config.flying_interval_ms))),
            (Event::Landing, Timer::new(ms(config.landing_interval_ms))),
            (Event::Crash, Timer::new(ms(config.crash_interval_ms))),
        ]);

        Self {
            low_battery_percent: config.low_battery_percent,
            timers: Mutex::new(timers),
            handlers: RwLock::new(HashMap::new()),
            takeoff_pending: AtomicBool::new(false),
            stop_pending: AtomicBool::new(false),
        }
    }

    /// Register (or replace) the callback for `event`
    pub fn on_event(&self, event: Event, callback: EventCallback) {
        write(&self.handlers).insert(event, callback);
    }

    pub fn arm_takeoff(&self) {
        self.takeoff_pending.store(true, Ordering::Release);
    }

    pub fn arm_stop(&self) {
        self.stop_pending.store(true, Ordering::Release);
    }

    /// Evaluate one state sample, invoke callbacks and return what fired
    pub fn evaluate(&self, state: &State, now: Instant) -> Vec<Event> {
        let handlers = read(&self.handlers).clone();
        let mut fired = Vec::new();

        {
            let mut timers = lock(&self.timers);
            let mut check = |event: Event, condition: bool| {
                condition
                    && handlers.contains_key(&event)
                    && timers
                        .get_mut(&event)
                        .map_or(false, |timer| timer.due_and_reset(now))
            };

            if check(
                Event::UpsideDown,
                state.sensor_orientation != SensorOrientation::Normal,
            ) {
                fired.push(Event::UpsideDown);
            }

            if check(Event::LowBattery, state.battery < self.low_battery_percent) {
                fired.push(Event::LowBattery);
            }

            let mode_event = Event::for_mode(state.mode_flight).filter(|&event| check(event, true));

            match mode_event {
                Some(event) => fired.push(event),
                None => {
                    if handlers.contains_key(&Event::Takeoff)
                        && self.takeoff_pending.swap(false, Ordering::AcqRel)
                    {
                        fired.push(Event::Takeoff);
                    } else if handlers.contains_key(&Event::EmergencyStop)
                        && self.stop_pending.swap(false, Ordering::AcqRel)
                    {
                        fired.push(Event::EmergencyStop);
                    }
                }
            }
        }

        for event in &fired {
            debug!("Event fired: {:?}", event);
            if let Some(callback) = handlers.get(event) {
                callback();
            }
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::protocol::ModeVehicle;
    use std::sync::atomic::AtomicUsize;

    fn state(mode_flight: ModeFlight, orientation: SensorOrientation, battery: u8) -> State {
        State {
            mode_vehicle: ModeVehicle::FlightGuard,
            mode_system: 0,
            mode_flight,
            mode_drive: 0,
            sensor_orientation: orientation,
            coordinate: 0,
            battery,
        }
    }

    fn counting(watchdog: &Watchdog, event: Event) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        watchdog.on_event(
            event,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        count
    }

    fn register_all(watchdog: &Watchdog) {
        for event in Event::ALL {
            watchdog.on_event(event, Arc::new(|| {}));
        }
    }

    #[test]
    fn test_unregistered_conditions_do_not_fire() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        let now = Instant::now();

        let fired = watchdog.evaluate(&state(ModeFlight::Accident, SensorOrientation::Reverse, 5), now);
        assert!(fired.is_empty());
    }

    #[test]
    fn test_upside_down_is_debounced() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        let count = counting(&watchdog, Event::UpsideDown);
        let start = Instant::now();
        let upside_down = state(ModeFlight::Unset, SensorOrientation::Reverse, 100);

        assert_eq!(watchdog.evaluate(&upside_down, start), vec![Event::UpsideDown]);
        assert!(watchdog.evaluate(&upside_down, start + Duration::from_secs(1)).is_empty());
        assert!(watchdog.evaluate(&upside_down, start + Duration::from_millis(4999)).is_empty());
        assert_eq!(
            watchdog.evaluate(&upside_down, start + Duration::from_secs(5)),
            vec![Event::UpsideDown]
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_low_battery_threshold() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        counting(&watchdog, Event::LowBattery);
        let now = Instant::now();

        assert!(watchdog
            .evaluate(&state(ModeFlight::Unset, SensorOrientation::Normal, 50), now)
            .is_empty());
        assert_eq!(
            watchdog.evaluate(&state(ModeFlight::Unset, SensorOrientation::Normal, 49), now),
            vec![Event::LowBattery]
        );
    }

    #[test]
    fn test_low_battery_is_debounced() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        let count = counting(&watchdog, Event::LowBattery);
        let start = Instant::now();
        let low = state(ModeFlight::Flight, SensorOrientation::Normal, 20);

        assert_eq!(watchdog.evaluate(&low, start), vec![Event::LowBattery]);
        for ms in (500..10_000).step_by(500) {
            assert!(watchdog.evaluate(&low, start + Duration::from_millis(ms)).is_empty());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(
            watchdog.evaluate(&low, start + Duration::from_secs(10)),
            vec![Event::LowBattery]
        );
        assert!(watchdog.evaluate(&low, start + Duration::from_millis(10_100)).is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_independent_conditions_fire_together() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        register_all(&watchdog);

        let fired = watchdog.evaluate(
            &state(ModeFlight::Flight, SensorOrientation::Reverse, 10),
            Instant::now(),
        );
        assert_eq!(fired, vec![Event::UpsideDown, Event::LowBattery, Event::Flying]);
    }

    #[test]
    fn test_flight_modes_are_mutually_exclusive() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        register_all(&watchdog);
        let start = Instant::now();

        // Ready then Flight then Landing, 100 ms apart: each mode fires once
        let sequence = [
            (ModeFlight::Ready, Event::Ready),
            (ModeFlight::Flight, Event::Flying),
            (ModeFlight::Landing, Event::Landing),
            (ModeFlight::Accident, Event::Crash),
        ];

        for (i, (mode, expected)) in sequence.into_iter().enumerate() {
            let now = start + Duration::from_millis(100 * i as u64);
            let fired = watchdog.evaluate(&state(mode, SensorOrientation::Normal, 100), now);
            assert_eq!(fired, vec![expected]);
        }

        // Still in Accident shortly after: debounced
        let fired = watchdog.evaluate(
            &state(ModeFlight::Accident, SensorOrientation::Normal, 100),
            start + Duration::from_millis(500),
        );
        assert!(fired.is_empty());
    }

    #[test]
    fn test_takeoff_token_fires_once() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        let count = counting(&watchdog, Event::Takeoff);
        let now = Instant::now();
        let idle = state(ModeFlight::TakeOff, SensorOrientation::Normal, 100);

        assert!(watchdog.evaluate(&idle, now).is_empty());

        watchdog.arm_takeoff();
        assert_eq!(watchdog.evaluate(&idle, now), vec![Event::Takeoff]);
        assert!(watchdog.evaluate(&idle, now).is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tokens_wait_for_mode_event() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        register_all(&watchdog);
        let start = Instant::now();
        let flying = state(ModeFlight::Flight, SensorOrientation::Normal, 100);

        watchdog.arm_takeoff();
        watchdog.arm_stop();

        // Flying fires first and stops evaluation
        assert_eq!(watchdog.evaluate(&flying, start), vec![Event::Flying]);

        // Flying is now debounced, so the tokens fire one per sample
        let later = start + Duration::from_millis(100);
        assert_eq!(watchdog.evaluate(&flying, later), vec![Event::Takeoff]);
        assert_eq!(watchdog.evaluate(&flying, later), vec![Event::EmergencyStop]);
        assert!(watchdog.evaluate(&flying, later).is_empty());
    }

    #[test]
    fn test_token_kept_without_handler() {
        let watchdog = Watchdog::new(&EventsConfig::default());
        let now = Instant::now();
        let sample = state(ModeFlight::Stop, SensorOrientation::Normal, 100);

        watchdog.arm_stop();
        assert!(watchdog.evaluate(&sample, now).is_empty());

        let count = counting(&watchdog, Event::EmergencyStop);
        assert_eq!(watchdog.evaluate(&sample, now), vec![Event::EmergencyStop]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_register_handlers() {
        let watchdog = Arc::new(Watchdog::new(&EventsConfig::default()));
        let inner = watchdog.clone();
        watchdog.on_event(
            Event::Crash,
            Arc::new(move || inner.on_event(Event::Ready, Arc::new(|| {}))),
        );

        let fired = watchdog.evaluate(
            &state(ModeFlight::Accident, SensorOrientation::Normal, 100),
            Instant::now(),
        );
        assert_eq!(fired, vec![Event::Crash]);
    }
}
