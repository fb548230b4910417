//! Concrete role configurations. The set is closed: one type per
//! [`RoleKind`](crate::config::RoleKind).

mod camera;
mod coordinator;
mod remote;
mod router;
mod sensor;

pub use camera::CameraRole;
pub use coordinator::CoordinatorRole;
pub use remote::RemoteRole;
pub use router::RouterRole;
pub use sensor::SensorRole;

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
