use super::reflection_table::{Reflection, ReflectionBatch};

/// Consumes the bounces produced by the ray tracer.
///
/// The tracer calls [`process`](Self::process) once per batch and depth, in
/// increasing depth order, and [`finish`](Self::finish) once at the end.
/// Processors are composed as tuples.
pub trait ReflectionProcessor {
    type Output;

    /// Depth rows the tracer must emit for every batch, even after all of
    /// its rays have stopped.
    fn required_depth(&self) -> usize {
        0
    }

    fn process(&mut self, batch: &ReflectionBatch<'_>);

    fn finish(self) -> Self::Output;
}

impl<A, B> ReflectionProcessor for (A, B)
where
    A: ReflectionProcessor,
    B: ReflectionProcessor,
{
    type Output = (A::Output, B::Output);

    fn required_depth(&self) -> usize {
        self.0.required_depth().max(self.1.required_depth())
    }

    fn process(&mut self, batch: &ReflectionBatch<'_>) {
        self.0.process(batch);
        self.1.process(batch);
    }

    fn finish(self) -> Self::Output {
        (self.0.finish(), self.1.finish())
    }
}

impl<A, B, C> ReflectionProcessor for (A, B, C)
where
    A: ReflectionProcessor,
    B: ReflectionProcessor,
    C: ReflectionProcessor,
{
    type Output = (A::Output, B::Output, C::Output);

    fn required_depth(&self) -> usize {
        self.0
            .required_depth()
            .max(self.1.required_depth())
            .max(self.2.required_depth())
    }

    fn process(&mut self, batch: &ReflectionBatch<'_>) {
        self.0.process(batch);
        self.1.process(batch);
        self.2.process(batch);
    }

    fn finish(self) -> Self::Output {
        (self.0.finish(), self.1.finish(), self.2.finish())
    }
}

/// Keeps the reflections of the first `rays` rays for display.
pub struct VisualCapture {
    rays: usize,
    paths: Vec<Vec<Reflection>>,
}

impl VisualCapture {
    pub fn new(rays: usize) -> Self {
        Self {
            rays,
            paths: vec![Vec::new(); rays],
        }
    }
}

impl ReflectionProcessor for VisualCapture {
    type Output = Vec<Vec<Reflection>>;

    fn process(&mut self, batch: &ReflectionBatch<'_>) {
        for (i, reflection) in batch.reflections.iter().enumerate() {
            let ray = batch.first_ray + i;
            if ray >= self.rays {
                break;
            }
            if let Some(r) = reflection {
                self.paths[ray].push(*r);
            }
        }
    }

    fn finish(self) -> Self::Output {
        self.paths
    }
}
