use crate::{Prog, Test, TestResult};
use std::collections::BTreeMap;

/// `testset[test][prog] -> TestResult`: one tester-vs-testee slab of the
/// tournament state matrix. `BTreeMap` keeps JSON and CSV output
/// deterministic without an explicit sort at every call site.
pub type TestSet = BTreeMap<Test, BTreeMap<Prog, TestResult>>;

/// Build a [`TestSet`] with every `(test, prog)` cell set to `NotTested`.
pub fn default_testset(tests: &[Test], progs: &[Prog]) -> TestSet {
	let mut set = TestSet::new();
	for test in tests {
		let mut row = BTreeMap::new();
		for prog in progs {
			row.insert(prog.clone(), TestResult::NotTested);
		}
		set.insert(test.clone(), row);
	}
	set
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_testset_covers_full_cross_product() {
		let tests = vec![Test::from("t1"), Test::from("t2")];
		let progs = vec![Prog::from("p1")];
		let set = default_testset(&tests, &progs);
		assert_eq!(set.len(), 2);
		assert_eq!(set[&tests[0]][&progs[0]], TestResult::NotTested);
		assert_eq!(set[&tests[1]][&progs[0]], TestResult::NotTested);
	}
}
