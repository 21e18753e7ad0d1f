use core::fmt::Write;

use camino::Utf8PathBuf;
use eyre::{bail, Result as EyreResult};
use tokio::fs::write;

use crate::auth;
use crate::config::Config;
use crate::connection::Connection;
use crate::output::OutputWriter;
use crate::protocol::DocumentApi;
use crate::TestEnvironment;

/// Everything a step needs: the user-authenticated document API plus the
/// raw credentials for steps that probe with wrong-class tokens.
#[derive(Debug)]
pub struct TestContext {
    pub api: DocumentApi,
    device_token: String,
    user_token: String,
    pub output_writer: OutputWriter,
}

pub trait Test {
    fn display_name(&self) -> String;
    async fn run_assert(&self, ctx: &mut TestContext) -> EyreResult<()>;
}

impl TestContext {
    pub fn host(&self) -> &str {
        self.api.connection().host()
    }

    pub fn device_token(&self) -> &str {
        &self.device_token
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }
}

pub struct Driver {
    environment: TestEnvironment,
    config: Config,
}

impl Driver {
    pub const fn new(environment: TestEnvironment, config: Config) -> Self {
        Self {
            environment,
            config,
        }
    }

    pub async fn run(&self) -> EyreResult<()> {
        let mut ctx = self.authenticate().await?;

        let mut report = TestRunReport::new();
        let mut scenario_failed = false;

        for (i, step) in self.config.steps.iter().enumerate() {
            if scenario_failed {
                report.steps.push(TestStepReport {
                    step_name: format!("{}. {}", i, step.display_name()),
                    result: None,
                });
                continue;
            }

            self.environment
                .output_writer
                .write_step(i, &step.display_name(), step)?;

            let result = step.run_assert(&mut ctx).await;

            if result.is_err() {
                scenario_failed = true;
                self.environment
                    .output_writer
                    .write_str(&format!("Error: {result:?}"));
            }

            report.steps.push(TestStepReport {
                step_name: format!("{}. {}", i, step.display_name()),
                result: Some(result),
            });
        }

        let report_file = report.store_to_file(&self.environment.output_dir).await?;

        self.environment
            .output_writer
            .write_str(&format!("Report file: {report_file:?}"));

        report.result()
    }

    /// The full credential handshake: admin token from the local secret
    /// store, discovery, enrollment code, device token, user token. Any
    /// non-success response aborts the run.
    async fn authenticate(&self) -> EyreResult<TestContext> {
        self.environment.output_writer.write_section("Authenticating");

        let admin_token = auth::mint_admin_token(&self.environment.db_path)?;

        let host = auth::discover(&Connection::new(self.environment.host.clone())).await?;

        self.environment
            .output_writer
            .write_str(&format!("Discovered service host: {host}"));

        let admin = Connection::new(host.clone()).with_token(admin_token);
        let code = auth::request_device_code(&admin).await?;

        let device_token = auth::register_device(
            &Connection::new(host.clone()),
            code,
            self.config.device.description.clone(),
            self.config.device.id.clone(),
        )
        .await?;

        let device = Connection::new(host.clone()).with_token(device_token.clone());
        let user_token = auth::create_user(&device).await?;

        self.environment
            .output_writer
            .write_str("Obtained device and user credentials");

        let api = DocumentApi::new(Connection::new(host).with_token(user_token.clone()));

        Ok(TestContext {
            api,
            device_token,
            user_token,
            output_writer: self.environment.output_writer,
        })
    }
}

pub struct TestRunReport {
    steps: Vec<TestStepReport>,
}

impl TestRunReport {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn result(&self) -> EyreResult<()> {
        let errors: Vec<String> = self
            .steps
            .iter()
            .filter_map(|step| match &step.result {
                Some(Err(e)) => Some(format!("{}: {e}", step.step_name)),
                _ => None,
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            bail!("Errors occurred during test run: {:?}", errors)
        }
    }

    async fn store_to_file(&self, folder: &Utf8PathBuf) -> EyreResult<Utf8PathBuf> {
        let markdown = self.to_markdown()?;
        let report_file = folder.join("report.md");
        write(&report_file, markdown).await?;
        Ok(report_file)
    }

    fn to_markdown(&self) -> EyreResult<String> {
        let mut markdown = String::new();

        writeln!(&mut markdown, "## Conformance test report")?;
        writeln!(&mut markdown)?;
        writeln!(&mut markdown, "| Step | Result |")?;
        writeln!(&mut markdown, "| :--- | :---: |")?;

        for step in &self.steps {
            let result = step.result.as_ref().map_or(":fast_forward:", |result| {
                match result {
                    Ok(()) => ":white_check_mark:",
                    Err(_) => ":x:",
                }
            });

            writeln!(&mut markdown, "| {} | {result} |", step.step_name)?;
        }

        Ok(markdown)
    }
}

struct TestStepReport {
    step_name: String,
    /// `None` when the step was skipped because an earlier one failed.
    result: Option<EyreResult<()>>,
}

#[cfg(test)]
mod tests {
    use eyre::eyre;

    use super::*;

    #[test]
    fn report_renders_pass_fail_and_skip() {
        let report = TestRunReport {
            steps: vec![
                TestStepReport {
                    step_name: "0. authorization boundary".to_owned(),
                    result: Some(Ok(())),
                },
                TestStepReport {
                    step_name: "1. document lifecycle (128 iterations)".to_owned(),
                    result: Some(Err(eyre!("boom"))),
                },
                TestStepReport {
                    step_name: "2. concurrent stress (32 writers)".to_owned(),
                    result: None,
                },
            ],
        };

        let markdown = report.to_markdown().expect("render");

        assert!(markdown.contains("| 0. authorization boundary | :white_check_mark: |"));
        assert!(markdown.contains("| 1. document lifecycle (128 iterations) | :x: |"));
        assert!(markdown.contains("| 2. concurrent stress (32 writers) | :fast_forward: |"));
        assert!(report.result().is_err());
    }

    #[test]
    fn all_green_report_is_a_success() {
        let report = TestRunReport {
            steps: vec![TestStepReport {
                step_name: "0. concurrent stress (32 writers)".to_owned(),
                result: Some(Ok(())),
            }],
        };

        report.result().expect("no failures recorded");
    }
}
