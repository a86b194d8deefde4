pub mod keypoint;
pub mod topology;

pub use keypoint::{HandSide, Landmark, Skeleton, CHANNELS, HAND_LANDMARKS, POSE_LANDMARKS};
pub use topology::{Link, Topology, HAND_CONNECTIONS, POSE_CONNECTIONS};
