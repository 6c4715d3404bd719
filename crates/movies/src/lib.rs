// cmdbus Movies - demo application on the command bus
// Composition root shared by the `cmdbus` CLI and the `cmdbus-worker` daemon

pub mod bootstrap;
pub mod command;
pub mod handlers;
pub mod logging;
pub mod settings;

pub use bootstrap::{MovieBus, Stores, RENT_MOVIE_QUEUE};
pub use command::{Action, MovieCommand, UnknownAction};
pub use handlers::{BuyMovieHandler, MemorySink, OutputSink, RentMovieHandler, StdoutSink};
pub use settings::{QueueTarget, Settings};
