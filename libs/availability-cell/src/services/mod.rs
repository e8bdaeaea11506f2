pub mod blocking;
pub mod poller;
pub mod store;

pub use blocking::BlockingService;
pub use poller::{AgendaCache, AgendaPoller, AgendaSnapshot};
pub use store::{AgendaStore, AppointmentQuery, SupabaseAgendaStore};
