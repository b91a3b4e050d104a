//! Synchronization primitives beyond `spin::Mutex`/`spin::RwLock`.

pub mod irq;

pub use irq::IrqGuard;
