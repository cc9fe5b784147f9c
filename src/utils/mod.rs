pub mod time;

/// Generates a collision-resistant identifier used for nodes and edges.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Generates a short identifier, used for decision branches.
pub fn shortid() -> String {
    nanoid::nanoid!(8)
}
