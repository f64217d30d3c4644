pub mod assignment;
pub mod availability;
pub mod directory;
pub mod features;
pub mod history;
pub mod optimizer;
pub mod scoring;

pub use assignment::DoctorAssignmentService;
pub use availability::AvailabilityValidator;
pub use directory::{
    AppointmentHistoryStore, CapacityLedger, DepartmentRoster, PatientDirectory, SupabaseDirectory,
};
pub use history::HistoryIndex;
pub use optimizer::AssignmentOptimizer;
pub use scoring::{CandidateScorer, FormulaScorer, WeightProfile};
