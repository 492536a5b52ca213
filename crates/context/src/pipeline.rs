//! Typed stage pipeline
//!
//! A [`Pipeline<I, O>`] is a chain of async [`Stage`]s where each stage's
//! output type is the next stage's input type. The first failing stage
//! stops the run; its error is logged with the stage name and returned
//! unchanged.

use async_trait::async_trait;
use ragforge_common::errors::Result;
use tracing::error;

/// One async step of a pipeline
#[async_trait]
pub trait Stage<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> Result<O>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// A composed chain of stages from `I` to `O`
pub struct Pipeline<I, O> {
    stage: Box<dyn Stage<I, O>>,
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<S>(stage: S) -> Self
    where
        S: Stage<I, O> + 'static,
    {
        Self {
            stage: Box::new(Logged(stage)),
        }
    }

    /// Append a stage consuming this pipeline's output
    pub fn then<P, S>(self, next: S) -> Pipeline<I, P>
    where
        P: Send + 'static,
        S: Stage<O, P> + 'static,
    {
        Pipeline {
            stage: Box::new(Chained {
                first: self.stage,
                second: Box::new(Logged(next)),
            }),
        }
    }

    pub async fn invoke(&self, input: I) -> Result<O> {
        self.stage.run(input).await
    }
}

struct Chained<I, M, O> {
    first: Box<dyn Stage<I, M>>,
    second: Box<dyn Stage<M, O>>,
}

#[async_trait]
impl<I, M, O> Stage<I, O> for Chained<I, M, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> Result<O> {
        let intermediate = self.first.run(input).await?;
        self.second.run(intermediate).await
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// Logs a failure of the wrapped stage before passing it on
struct Logged<S>(S);

#[async_trait]
impl<I, O, S> Stage<I, O> for Logged<S>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Stage<I, O>,
{
    async fn run(&self, input: I) -> Result<O> {
        self.0.run(input).await.inspect_err(|e| {
            error!(stage = self.0.name(), error = %e, "Pipeline stage failed");
        })
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragforge_common::errors::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Double;

    #[async_trait]
    impl Stage<i64, i64> for Double {
        async fn run(&self, input: i64) -> Result<i64> {
            Ok(input * 2)
        }

        fn name(&self) -> &'static str {
            "double"
        }
    }

    struct Render;

    #[async_trait]
    impl Stage<i64, String> for Render {
        async fn run(&self, input: i64) -> Result<String> {
            Ok(format!("value={}", input))
        }

        fn name(&self) -> &'static str {
            "render"
        }
    }

    struct Fail;

    #[async_trait]
    impl Stage<i64, i64> for Fail {
        async fn run(&self, _input: i64) -> Result<i64> {
            Err(AppError::provider("test", "boom"))
        }

        fn name(&self) -> &'static str {
            "fail"
        }
    }

    struct Count(Arc<AtomicUsize>);

    #[async_trait]
    impl Stage<i64, i64> for Count {
        async fn run(&self, input: i64) -> Result<i64> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(input)
        }

        fn name(&self) -> &'static str {
            "count"
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let pipeline = Pipeline::new(Double).then(Double).then(Render);
        assert_eq!(pipeline.invoke(3).await.unwrap(), "value=12");
    }

    #[tokio::test]
    async fn test_failure_stops_the_chain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(Double)
            .then(Fail)
            .then(Count(counter.clone()));

        let err = pipeline.invoke(1).await.unwrap_err();

        assert!(matches!(err, AppError::Provider { .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
