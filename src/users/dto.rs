use serde::{Deserialize, Deserializer, Serialize};

use crate::users::repo_types::Role;

/// One optional request field as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Null,
    Present(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<'de, T> Deserialize<'de> for Field<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only reached when the key is present; a missing key falls back to Default.
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Field::Present(value),
            None => Field::Null,
        })
    }
}

/// Request body for user creation. `role` and `is_active` may be omitted but not null.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: Field<Role>,
    #[serde(default)]
    pub is_active: Field<bool>,
}

/// Request body for a partial update; the id comes from the path.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: Field<String>,
    #[serde(default)]
    pub first_name: Field<String>,
    #[serde(default)]
    pub last_name: Field<String>,
    #[serde(default)]
    pub role: Field<Role>,
    #[serde(default)]
    pub is_active: Field<bool>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteUserResponse {
    pub success: bool,
}
