//! Filling a mounted volume with many small files
//!
//! Files are created inside the pod by `kubectl exec`, one shell loop per
//! batch, so progress is visible and a stalled exec loses at most one batch.

use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::claim::PodRef;
use crate::Error;

/// Output of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited successfully
    pub success: bool,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Runs kubectl (mockable in tests)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `kubectl` with the given arguments
    async fn kubectl(&self, args: &[String]) -> Result<CommandOutput, Error>;
}

/// Runs the real `kubectl` binary from `PATH`
#[derive(Default, Clone)]
pub struct RealCommandRunner {
    kubeconfig: Option<String>,
}

impl RealCommandRunner {
    /// Use an explicit kubeconfig instead of kubectl's default resolution
    pub fn with_kubeconfig(kubeconfig: impl Into<String>) -> Self {
        Self {
            kubeconfig: Some(kubeconfig.into()),
        }
    }
}

#[async_trait]
impl CommandRunner for RealCommandRunner {
    async fn kubectl(&self, args: &[String]) -> Result<CommandOutput, Error> {
        let mut command = Command::new("kubectl");
        if let Some(kubeconfig) = &self.kubeconfig {
            command.arg("--kubeconfig").arg(kubeconfig);
        }
        let output = command
            .args(args)
            .output()
            .await
            .map_err(|e| Error::command("kubectl", format!("failed to spawn: {}", e)))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// `df -P` figures for one mount point, in KiB
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    /// Backing filesystem
    pub filesystem: String,
    /// Total size
    pub total_kib: u64,
    /// Used
    pub used_kib: u64,
    /// Available
    pub available_kib: u64,
    /// Used percentage as reported by df
    pub capacity_percent: u8,
    /// Mount point
    pub mount_point: String,
}

impl fmt::Display for DiskUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: {} KiB used of {} KiB ({}%)",
            self.filesystem, self.mount_point, self.used_kib, self.total_kib, self.capacity_percent
        )
    }
}

/// Parse `df -P` output and pick the row for `mount_point`
pub fn parse_df(output: &str, mount_point: &str) -> Option<DiskUsage> {
    output.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // Filesystem names may contain spaces; everything else is fixed
        if fields.len() < 6 {
            return None;
        }
        let tail = &fields[fields.len() - 5..];
        if tail[4] != mount_point {
            return None;
        }
        Some(DiskUsage {
            filesystem: fields[..fields.len() - 5].join(" "),
            total_kib: tail[0].parse().ok()?,
            used_kib: tail[1].parse().ok()?,
            available_kib: tail[2].parse().ok()?,
            capacity_percent: tail[3].trim_end_matches('%').parse().ok()?,
            mount_point: tail[4].to_string(),
        })
    })
}

/// Puts file load on a mounted volume and reads back usage
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    /// Create `file_count` small files under `target_path` inside the pod
    async fn populate(&self, pod: &PodRef, target_path: &str, file_count: u64) -> Result<(), Error>;

    /// Disk usage of the filesystem mounted at `target_path`
    async fn disk_usage(&self, pod: &PodRef, target_path: &str) -> Result<DiskUsage, Error>;
}

/// Generates load through `kubectl exec`
pub struct KubectlLoadGenerator<R: CommandRunner = RealCommandRunner> {
    runner: R,
    batch_size: u64,
}

impl KubectlLoadGenerator<RealCommandRunner> {
    /// Create a generator using the real kubectl
    pub fn new(batch_size: u64) -> Self {
        Self::with_runner(RealCommandRunner::default(), batch_size)
    }
}

impl<R: CommandRunner> KubectlLoadGenerator<R> {
    /// Create a generator with a custom runner
    pub fn with_runner(runner: R, batch_size: u64) -> Self {
        Self {
            runner,
            batch_size: batch_size.max(1),
        }
    }

    async fn exec(&self, pod: &PodRef, script: String) -> Result<String, Error> {
        let args = exec_args(pod, script);
        let output = self.runner.kubectl(&args).await?;
        if !output.success {
            return Err(Error::command(
                format!("kubectl exec {}", pod),
                output.stderr.trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

fn exec_args(pod: &PodRef, script: String) -> Vec<String> {
    vec![
        "-n".to_string(),
        pod.namespace.clone(),
        "exec".to_string(),
        pod.name.clone(),
        "--".to_string(),
        "sh".to_string(),
        "-c".to_string(),
        script,
    ]
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell loop creating files `f<start>`..`f<end - 1>` in `dir`
fn batch_script(dir: &str, start: u64, end: u64) -> String {
    let dir = shell_quote(dir);
    format!(
        "mkdir -p {dir} && i={start}; while [ $i -lt {end} ]; do echo A > {dir}/f$i; i=$((i+1)); done"
    )
}

#[async_trait]
impl<R: CommandRunner> LoadGenerator for KubectlLoadGenerator<R> {
    async fn populate(&self, pod: &PodRef, target_path: &str, file_count: u64) -> Result<(), Error> {
        let dir = format!("{}/files", target_path.trim_end_matches('/'));
        info!(pod = %pod, dir, file_count, batch = self.batch_size, "populating volume");

        let mut start = 0;
        while start < file_count {
            let end = (start + self.batch_size).min(file_count);
            self.exec(pod, batch_script(&dir, start, end)).await?;
            debug!(pod = %pod, created = end, "batch created");
            start = end;
        }
        info!(pod = %pod, file_count, "volume populated");
        Ok(())
    }

    async fn disk_usage(&self, pod: &PodRef, target_path: &str) -> Result<DiskUsage, Error> {
        let stdout = self
            .exec(pod, format!("df -P {}", shell_quote(target_path)))
            .await?;
        parse_df(&stdout, target_path).ok_or_else(|| {
            Error::command(
                format!("df -P {}", target_path),
                format!("no row for mount point in output: {}", stdout.trim()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const DF: &str = "Filesystem     1024-blocks  Used Available Capacity Mounted on
overlay 125293548 20411384 104882164 17% /
172.30.1.1:6789,172.30.1.2:6789:/volumes/csi/csi-vol-1 20971520 4194304 16777216 20% /var/lib/www/html
";

    fn pod() -> PodRef {
        PodRef {
            name: "cephfs-test-pod".to_string(),
            namespace: "default".to_string(),
        }
    }

    #[test]
    fn test_parse_df_finds_mount_row() {
        let usage = parse_df(DF, "/var/lib/www/html").expect("row");
        assert_eq!(usage.total_kib, 20_971_520);
        assert_eq!(usage.used_kib, 4_194_304);
        assert_eq!(usage.available_kib, 16_777_216);
        assert_eq!(usage.capacity_percent, 20);
        assert!(usage.filesystem.ends_with("csi-vol-1"));
    }

    #[test]
    fn test_parse_df_missing_mount() {
        assert!(parse_df(DF, "/mnt/other").is_none());
        assert!(parse_df("", "/").is_none());
    }

    #[test]
    fn test_batch_script_bounds() {
        let script = batch_script("/data/files", 100, 200);
        assert!(script.starts_with("mkdir -p '/data/files'"));
        assert!(script.contains("i=100;"));
        assert!(script.contains("-lt 200"));
    }

    /// Story: a million files go in as ten exec calls of 100k
    #[tokio::test]
    async fn story_populate_splits_into_batches() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let mut runner = MockCommandRunner::new();
        runner.expect_kubectl().returning(move |args| {
            seen.lock().unwrap().push(args.to_vec());
            Ok(CommandOutput {
                success: true,
                ..Default::default()
            })
        });

        let generator = KubectlLoadGenerator::with_runner(runner, 100_000);
        generator
            .populate(&pod(), "/var/lib/www/html/", 1_000_000)
            .await
            .expect("populated");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 10);
        assert_eq!(&calls[0][..5], ["-n", "default", "exec", "cephfs-test-pod", "--"]);
        assert!(calls[9][7].contains("i=900000;"));
        assert!(calls[9][7].contains("-lt 1000000"));
        assert!(calls[0][7].contains("'/var/lib/www/html/files'"));
    }

    #[tokio::test]
    async fn test_populate_uneven_last_batch() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_kubectl()
            .withf(|args| args[7].contains("-lt 250"))
            .times(1)
            .returning(|_| Ok(CommandOutput { success: true, ..Default::default() }));
        runner
            .expect_kubectl()
            .times(2)
            .returning(|_| Ok(CommandOutput { success: true, ..Default::default() }));

        KubectlLoadGenerator::with_runner(runner, 100)
            .populate(&pod(), "/data", 250)
            .await
            .expect("populated");
    }

    #[tokio::test]
    async fn test_failed_exec_surfaces_stderr() {
        let mut runner = MockCommandRunner::new();
        runner.expect_kubectl().returning(|_| {
            Ok(CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: "No space left on device\n".to_string(),
            })
        });

        let err = KubectlLoadGenerator::with_runner(runner, 10)
            .populate(&pod(), "/data", 5)
            .await
            .expect_err("exec failed");
        match err {
            Error::Command { message, .. } => assert_eq!(message, "No space left on device"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_disk_usage_reads_df() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_kubectl()
            .withf(|args| args[7] == "df -P '/var/lib/www/html'")
            .returning(|_| {
                Ok(CommandOutput {
                    success: true,
                    stdout: DF.to_string(),
                    stderr: String::new(),
                })
            });

        let usage = KubectlLoadGenerator::with_runner(runner, 10)
            .disk_usage(&pod(), "/var/lib/www/html")
            .await
            .expect("usage");
        assert_eq!(usage.capacity_percent, 20);
    }
}
