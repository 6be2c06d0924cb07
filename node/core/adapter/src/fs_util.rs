use std::path::Path;

/// Recursively copy `src` into `dst`, creating `dst` if needed. Runs on the
/// blocking thread pool since `std::fs` has no async equivalent that beats
/// it for whole-tree copies.
pub async fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
	let src = src.to_path_buf();
	let dst = dst.to_path_buf();
	tokio::task::spawn_blocking(move || copy_dir_all_blocking(&src, &dst))
		.await
		.expect("copy_dir_all task panicked")
}

fn copy_dir_all_blocking(src: &Path, dst: &Path) -> std::io::Result<()> {
	std::fs::create_dir_all(dst)?;
	for entry in std::fs::read_dir(src)? {
		let entry = entry?;
		let file_type = entry.file_type()?;
		let dst_path = dst.join(entry.file_name());
		if file_type.is_dir() {
			copy_dir_all_blocking(&entry.path(), &dst_path)?;
		} else if file_type.is_symlink() {
			let target = std::fs::read_link(entry.path())?;
			#[cfg(unix)]
			std::os::unix::fs::symlink(target, &dst_path)?;
			#[cfg(not(unix))]
			let _ = target;
		} else {
			std::fs::copy(entry.path(), &dst_path)?;
		}
	}
	Ok(())
}

/// Remove `path` if it exists, ignoring "not found" errors.
pub async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
	match tokio::fs::remove_dir_all(path).await {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e),
	}
}

/// Replace `link` with a fresh symlink pointing at `target`.
pub async fn relink(target: &Path, link: &Path) -> std::io::Result<()> {
	remove_dir_if_exists(link).await.ok();
	let _ = tokio::fs::remove_file(link).await;
	let target = target.to_path_buf();
	let link = link.to_path_buf();
	tokio::task::spawn_blocking(move || {
		#[cfg(unix)]
		{
			std::os::unix::fs::symlink(&target, &link)
		}
		#[cfg(not(unix))]
		{
			let _ = (&target, &link);
			Ok(())
		}
	})
	.await
	.expect("relink task panicked")
}
