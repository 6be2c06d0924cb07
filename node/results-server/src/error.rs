use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResultsServerError {
	#[error("i/o error binding the results server: {0}")]
	Bind(#[source] std::io::Error),
}
