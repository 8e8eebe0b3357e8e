pub mod classroom;
pub mod evaluation;
pub mod lifecycle;
pub mod program;
pub mod run;
pub mod snapshot;
pub mod user;
pub mod whatsapp;

/// Collection names in the document store
pub mod collections {
    pub const USERS: &str = "users";
    pub const PROGRAMS: &str = "programs";
    pub const CLASSROOMS: &str = "classrooms";
    pub const EVALUATIONS: &str = "evaluations";
    pub const ATTENDANCE: &str = "attendance";
    pub const PARTICIPATIONS: &str = "participations";
    pub const CLASSROOM_RUNS: &str = "classroom_runs";
    pub const FINALIZATION_SNAPSHOTS: &str = "finalization_snapshots";
}

/// Minimum final grade (percentage) that counts as passing
pub const PASSING_GRADE: f64 = 70.0;
