//! Mapped-entity token for the query builder.

/// Identifies a mapped table to the query builder.
///
/// Implemented by the caller's model layer; the manager only reads the
/// table name and the column projection, never the entity's shape.
///
/// ```
/// use db_manager::Entity;
///
/// struct Vehicle;
///
/// impl Entity for Vehicle {
///     const TABLE: &'static str = "vehicles";
///     const COLUMNS: &'static [&'static str] = &["id", "plate", "owner_id"];
/// }
/// ```
pub trait Entity {
    /// Table the entity maps to.
    const TABLE: &'static str;

    /// Ordered column projection used for SELECT statements.
    const COLUMNS: &'static [&'static str];
}
