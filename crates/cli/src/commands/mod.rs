pub mod agent;
pub mod agents;
pub mod doctor;
pub mod onboard;
pub mod playground;
