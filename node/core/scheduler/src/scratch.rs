use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tourney_node_core_adapter::{copy_dir_all, AssignmentAdapter};

/// A fixed pool of on-disk scratch directories under `head_to_head/`, one
/// per concurrent worker slot. Each slot's directory is seeded from the
/// assignment's source tree lazily, on first use, and then reused for the
/// life of the daemon. Grounded on `processing/main.py::run_tests`, which
/// copies the assignment source into `HEAD_TO_HEAD_DIR/<process name>` only
/// if that directory doesn't already exist; here "process name" becomes a
/// slot index since there is no multiprocessing worker identity to key on.
pub struct ScratchPool {
	head_to_head_dir: PathBuf,
	dirs: Vec<OnceCell<PathBuf>>,
	free_tx: mpsc::Sender<usize>,
	free_rx: Mutex<mpsc::Receiver<usize>>,
}

impl ScratchPool {
	pub fn new(head_to_head_dir: PathBuf, slots: usize) -> Arc<Self> {
		let slots = slots.max(1);
		let (free_tx, rx) = mpsc::channel(slots);
		for slot in 0..slots {
			free_tx.try_send(slot).expect("a freshly created channel has capacity for every slot");
		}
		Arc::new(Self {
			head_to_head_dir,
			dirs: (0..slots).map(|_| OnceCell::new()).collect(),
			free_tx,
			free_rx: Mutex::new(rx),
		})
	}

	/// Reserve a free slot, blocking until one is available, and return a
	/// guard whose scratch directory is ready for use. The slot returns to
	/// the pool when the guard is dropped.
	pub async fn acquire(self: &Arc<Self>, adapter: &dyn AssignmentAdapter) -> std::io::Result<ScratchGuard> {
		let idx = {
			let mut rx = self.free_rx.lock().await;
			rx.recv().await.expect("the pool holds a sender for as long as it's alive, so recv never fails")
		};

		let dir = self.dirs[idx]
			.get_or_try_init(|| async {
				let dir = self.head_to_head_dir.join(format!("worker_{idx}"));
				if !dir.is_dir() {
					copy_dir_all(adapter.source_dir(), &dir).await?;
				}
				Ok::<PathBuf, std::io::Error>(dir)
			})
			.await?
			.clone();

		Ok(ScratchGuard { pool: self.clone(), idx, dir })
	}
}

pub struct ScratchGuard {
	pool: Arc<ScratchPool>,
	idx: usize,
	dir: PathBuf,
}

impl ScratchGuard {
	pub fn path(&self) -> &Path {
		&self.dir
	}
}

impl Drop for ScratchGuard {
	fn drop(&mut self) {
		let _ = self.pool.free_tx.try_send(self.idx);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tourney_node_core_adapter::JunitAssignment;

	fn assignment_dir() -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("tests/T1")).unwrap();
		std::fs::create_dir_all(dir.path().join("programs/original")).unwrap();
		dir
	}

	#[tokio::test]
	async fn slot_directory_is_created_once_and_reused() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let scratch_root = tempfile::tempdir().unwrap();
		let pool = ScratchPool::new(scratch_root.path().to_path_buf(), 1);

		let first = pool.acquire(&adapter).await.unwrap();
		let first_path = first.path().to_path_buf();
		assert!(first_path.join("tests").is_dir());
		drop(first);

		let second = pool.acquire(&adapter).await.unwrap();
		assert_eq!(second.path(), first_path);
	}

	#[tokio::test]
	async fn pool_bounds_concurrency_to_its_slot_count() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let scratch_root = tempfile::tempdir().unwrap();
		let pool = ScratchPool::new(scratch_root.path().to_path_buf(), 1);

		let first = pool.acquire(&adapter).await.unwrap();
		let blocked = tokio::time::timeout(std::time::Duration::from_millis(50), pool.acquire(&adapter)).await;
		assert!(blocked.is_err(), "second acquire should block while the single slot is held");
		drop(first);
	}
}
