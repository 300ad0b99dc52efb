use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

pub trait VolumeControl {
    fn level(&self) -> f32;
    fn set_level(&self, level: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    Completed,
    Superseded,
}

#[derive(Debug, Clone)]
pub struct Fader {
    generation: Rc<Cell<u64>>,
    step: Duration,
}

impl Fader {
    pub fn new(step: Duration) -> Self {
        Self {
            generation: Rc::new(Cell::new(0)),
            step: step.max(Duration::from_millis(1)),
        }
    }

    pub fn cancel(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    pub async fn ramp(&self, sink: &dyn VolumeControl, target: f32, duration: Duration) -> FadeOutcome {
        self.cancel();
        let generation = self.generation.get();
        let target = target.clamp(0.0, 1.0);
        let start = sink.level();

        if duration.is_zero() {
            sink.set_level(target);
            return FadeOutcome::Completed;
        }

        let began = Instant::now();
        loop {
            sleep(self.step.min(duration)).await;
            if self.generation.get() != generation {
                return FadeOutcome::Superseded;
            }

            let progress = (began.elapsed().as_secs_f32() / duration.as_secs_f32()).min(1.0);
            if progress >= 1.0 {
                sink.set_level(target);
                return FadeOutcome::Completed;
            }
            sink.set_level(start + (target - start) * progress);
        }
    }
}
