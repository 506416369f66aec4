// Git plumbing: subprocess worker, remote binding, change committer.

pub mod commit;
pub mod remote;
pub mod worker;
