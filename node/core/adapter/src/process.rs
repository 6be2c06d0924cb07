use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A completed subprocess invocation: its exit code (`None` if killed by a
/// timeout) and combined stdout/stderr.
pub struct Finished {
	pub status: Option<i32>,
	pub output: String,
	pub timed_out: bool,
}

/// Run a shell command in `cwd`, capturing stdout and stderr combined, with
/// a deadline after which the whole process group is killed and `timed_out`
/// is set. Mirrors the original's `subprocess.run(..., shell=True)`
/// invocations, but unlike the original also reaps grandchildren: the
/// command runs in its own session so a timed-out fuzzer that has forked
/// workers doesn't leave them running after we give up on it.
pub async fn run_shell(command: &str, cwd: &Path, timeout: Duration) -> std::io::Result<Finished> {
	let mut child = unsafe {
		Command::new("sh")
			.arg("-c")
			.arg(command)
			.current_dir(cwd)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.pre_exec(|| nix::unistd::setsid().map(|_| ()).map_err(std::io::Error::from))
			.spawn()?
	};
	let pgid = child.id().expect("child has not been polled yet") as libc::pid_t;

	let stdout = child.stdout.take().expect("piped stdout");
	let stderr = child.stderr.take().expect("piped stderr");

	let combined = tokio::spawn(async move {
		use tokio::io::AsyncReadExt;
		let mut stdout = stdout;
		let mut stderr = stderr;
		let mut out = String::new();
		let mut err = String::new();
		let _ = stdout.read_to_string(&mut out).await;
		let _ = stderr.read_to_string(&mut err).await;
		(out, err)
	});

	match tokio::time::timeout(timeout, child.wait()).await {
		Ok(status) => {
			let status = status?;
			let (out, err) = combined.await.unwrap_or_default();
			Ok(Finished { status: status.code(), output: format!("{out}{err}"), timed_out: false })
		}
		Err(_) => {
			kill_process_group(pgid);
			let _ = child.wait().await;
			let (out, err) = combined.await.unwrap_or_default();
			Ok(Finished { status: None, output: format!("{out}{err}"), timed_out: true })
		}
	}
}

/// `setsid()` in the child makes its pid its own process group id, so
/// `killpg` reaches every descendant it spawned, not just the shell itself.
fn kill_process_group(pgid: libc::pid_t) {
	// SAFETY: killpg with a valid pgid and SIGKILL has no memory-safety
	// implications; failure (e.g. the group already exited) is ignored.
	unsafe {
		libc::killpg(pgid, libc::SIGKILL);
	}
}
