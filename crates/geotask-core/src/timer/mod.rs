mod clock;

pub use clock::SessionClock;
