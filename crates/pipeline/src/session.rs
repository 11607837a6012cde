use crate::{Driver, Error, Evaluation, InputTable, JobOutput};
use batch_models::Task;
use serde::{Deserialize, Serialize};
use warehouse::ResultSet;

/// Session remembers the output of the most recent successful submission,
/// which is the target of subsequent fetches and evaluations.
///
/// A submission whose input is invalid leaves the remembered output as it
/// was. Otherwise the submission first clears it, so a job which fails
/// remotely leaves nothing to fetch or evaluate. While no output is
/// remembered, fetch and evaluate are no-ops which make no remote calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<JobOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evaluation: Option<Evaluation>,
}

impl Session {
    /// The output of the most recent successful submission, if any.
    pub fn output(&self) -> Option<&JobOutput> {
        self.output.as_ref()
    }

    /// The most recent evaluation of the current output, if any.
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    pub async fn submit(
        &mut self,
        driver: &Driver,
        input: &InputTable,
        column: &str,
        task: Task,
    ) -> Result<&JobOutput, Error> {
        driver.check_input(input, column)?;

        self.output = None;
        self.evaluation = None;

        let output = driver.submit(input, column, task).await?;
        Ok(self.output.insert(output))
    }

    pub async fn fetch(
        &self,
        driver: &Driver,
        delegated_token: Option<&str>,
    ) -> Result<Option<ResultSet>, Error> {
        let Some(output) = &self.output else {
            tracing::debug!("no output table to fetch");
            return Ok(None);
        };
        driver.fetch(output, delegated_token).await.map(Some)
    }

    pub async fn evaluate(&mut self, driver: &Driver) -> Result<Option<&Evaluation>, Error> {
        let Some(output) = &self.output else {
            tracing::debug!("no output table to evaluate");
            return Ok(None);
        };
        let evaluation = driver.evaluate(output).await?;
        Ok(Some(self.evaluation.insert(evaluation)))
    }
}
