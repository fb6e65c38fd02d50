use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;

use crate::types::Signals;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("sensor failed: {0}")]
    Failed(String),
    #[error("sensor timed out after {0:?}")]
    Timeout(Duration),
    #[error("sensor panicked")]
    Panicked,
    #[error("sensor returned a non-finite reading")]
    NonFinite,
}

impl SamplerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        SamplerError::Failed(reason.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SamplerError::Failed(_) => "failed",
            SamplerError::Timeout(_) => "timeout",
            SamplerError::Panicked => "panicked",
            SamplerError::NonFinite => "non_finite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Activity,
    Pressure,
    Mood,
    Entropy,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Activity,
        Channel::Pressure,
        Channel::Mood,
        Channel::Entropy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Activity => "activity",
            Channel::Pressure => "pressure",
            Channel::Mood => "mood",
            Channel::Entropy => "entropy",
        }
    }

    /// Neutral reading used when the sensor is absent or failing.
    pub fn default_value(&self) -> f64 {
        let neutral = Signals::default();
        match self {
            Channel::Activity => neutral.activity,
            Channel::Pressure => neutral.pressure,
            Channel::Mood => neutral.mood_pressure,
            Channel::Entropy => neutral.entropy,
        }
    }

    fn index(self) -> usize {
        match self {
            Channel::Activity => 0,
            Channel::Pressure => 1,
            Channel::Mood => 2,
            Channel::Entropy => 3,
        }
    }
}

type ReadFn = dyn Fn() -> BoxFuture<'static, Result<f64, SamplerError>> + Send + Sync;

/// An injected reading source for one channel.
#[derive(Clone)]
pub struct Sensor {
    read: Arc<ReadFn>,
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor").finish_non_exhaustive()
    }
}

impl Sensor {
    pub fn from_async<F, Fut>(read: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<f64, SamplerError>> + Send + 'static,
    {
        Sensor {
            read: Arc::new(move || read().boxed()),
        }
    }

    /// Wraps a blocking reader; each call runs on the blocking pool.
    pub fn blocking<F>(read: F) -> Self
    where
        F: Fn() -> Result<f64, SamplerError> + Send + Sync + 'static,
    {
        let read = Arc::new(read);
        Sensor::from_async(move || {
            let read = Arc::clone(&read);
            async move {
                match tokio::task::spawn_blocking(move || (*read)()).await {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => Err(SamplerError::Panicked),
                    Err(err) => Err(SamplerError::failed(err.to_string())),
                }
            }
        })
    }

    pub fn constant(value: f64) -> Self {
        Sensor::from_async(move || async move { Ok(value) })
    }
}

#[derive(Debug, Default, Clone)]
pub struct SamplerSensors {
    pub activity: Option<Sensor>,
    pub pressure: Option<Sensor>,
    pub mood: Option<Sensor>,
    pub entropy: Option<Sensor>,
}

impl SamplerSensors {
    fn get(&self, channel: Channel) -> Option<&Sensor> {
        match channel {
            Channel::Activity => self.activity.as_ref(),
            Channel::Pressure => self.pressure.as_ref(),
            Channel::Mood => self.mood.as_ref(),
            Channel::Entropy => self.entropy.as_ref(),
        }
    }
}

#[derive(Debug)]
pub struct SignalSampler {
    sensors: SamplerSensors,
    timeout: Duration,
    failing: [Option<&'static str>; 4],
}

impl SignalSampler {
    pub fn new(sensors: SamplerSensors, timeout: Duration) -> Self {
        SignalSampler {
            sensors,
            timeout,
            failing: [None; 4],
        }
    }

    /// Reads every channel concurrently; never fails.
    pub async fn sample(&mut self) -> Signals {
        let (activity, pressure, mood, entropy) = futures::join!(
            self.read(Channel::Activity),
            self.read(Channel::Pressure),
            self.read(Channel::Mood),
            self.read(Channel::Entropy),
        );
        Signals {
            activity: self.resolve(Channel::Activity, activity),
            pressure: self.resolve(Channel::Pressure, pressure),
            mood_pressure: self.resolve(Channel::Mood, mood),
            entropy: self.resolve(Channel::Entropy, entropy),
        }
    }

    async fn read(&self, channel: Channel) -> Result<f64, SamplerError> {
        let Some(sensor) = self.sensors.get(channel) else {
            return Ok(channel.default_value());
        };
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| (*sensor.read)())) {
            Ok(future) => future,
            Err(_) => return Err(SamplerError::Panicked),
        };
        match tokio::time::timeout(self.timeout, AssertUnwindSafe(future).catch_unwind()).await {
            Err(_) => Err(SamplerError::Timeout(self.timeout)),
            Ok(Err(_)) => Err(SamplerError::Panicked),
            Ok(Ok(result)) => result,
        }
    }

    /// Turns a raw sensor result into a usable reading. Failures fall back to
    /// the channel default and are logged once per kind until the channel
    /// recovers.
    pub fn resolve(&mut self, channel: Channel, result: Result<f64, SamplerError>) -> f64 {
        let result = result.and_then(|value| {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(SamplerError::NonFinite)
            }
        });
        let slot = &mut self.failing[channel.index()];
        match result {
            Ok(value) => {
                if let Some(kind) = slot.take() {
                    tracing::info!(channel = channel.as_str(), after = kind, "sampler.recovered");
                }
                value.clamp(0.0, 1.0)
            }
            Err(err) => {
                if *slot != Some(err.kind()) {
                    tracing::warn!(
                        channel = channel.as_str(),
                        kind = err.kind(),
                        error = %err,
                        "sampler.failed"
                    );
                    *slot = Some(err.kind());
                }
                channel.default_value()
            }
        }
    }

    pub fn is_failing(&self, channel: Channel) -> bool {
        self.failing[channel.index()].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broken_reading() -> Result<f64, SamplerError> {
        panic!("mood sensor")
    }

    fn sampler(sensors: SamplerSensors) -> SignalSampler {
        SignalSampler::new(sensors, Duration::from_millis(250))
    }

    #[tokio::test]
    async fn absent_sensors_use_neutral_defaults() {
        let mut sampler = sampler(SamplerSensors::default());
        assert_eq!(sampler.sample().await, Signals::default());
    }

    #[tokio::test]
    async fn readings_are_clamped() {
        let mut sampler = sampler(SamplerSensors {
            activity: Some(Sensor::constant(1.7)),
            pressure: Some(Sensor::constant(-0.2)),
            mood: Some(Sensor::blocking(|| Ok(0.25))),
            entropy: None,
        });
        let signals = sampler.sample().await;
        assert_eq!(signals.activity, 1.0);
        assert_eq!(signals.pressure, 0.0);
        assert_eq!(signals.mood_pressure, 0.25);
        assert_eq!(signals.entropy, 0.5);
    }

    #[tokio::test]
    async fn failures_fall_back_per_channel() {
        let mut sampler = sampler(SamplerSensors {
            activity: Some(Sensor::from_async(|| async {
                Err(SamplerError::failed("sensor offline"))
            })),
            pressure: Some(Sensor::constant(f64::NAN)),
            mood: Some(Sensor::from_async(|| async { broken_reading() })),
            entropy: Some(Sensor::constant(0.9)),
        });
        let signals = sampler.sample().await;
        assert_eq!(signals.activity, 0.5);
        assert_eq!(signals.pressure, 0.0);
        assert_eq!(signals.mood_pressure, 0.5);
        assert_eq!(signals.entropy, 0.9);
        assert!(sampler.is_failing(Channel::Activity));
        assert!(sampler.is_failing(Channel::Pressure));
        assert!(sampler.is_failing(Channel::Mood));
        assert!(!sampler.is_failing(Channel::Entropy));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sensor_times_out() {
        let mut sampler = sampler(SamplerSensors {
            activity: Some(Sensor::from_async(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(0.9)
            })),
            ..SamplerSensors::default()
        });
        assert_eq!(sampler.sample().await.activity, 0.5);
        assert!(sampler.is_failing(Channel::Activity));
    }

    #[test]
    fn recovery_clears_failure_state() {
        let mut sampler = sampler(SamplerSensors::default());
        assert_eq!(
            sampler.resolve(Channel::Activity, Err(SamplerError::Panicked)),
            0.5
        );
        assert!(sampler.is_failing(Channel::Activity));
        assert_eq!(sampler.resolve(Channel::Activity, Ok(0.3)), 0.3);
        assert!(!sampler.is_failing(Channel::Activity));
    }
}
