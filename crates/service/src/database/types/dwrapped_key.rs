use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

use common::crypto::WrappedKey;

/// Wrapped file key column, stored in its tagged text form
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct DWrappedKey(WrappedKey);

impl From<DWrappedKey> for WrappedKey {
    fn from(val: DWrappedKey) -> Self {
        val.0
    }
}

impl From<WrappedKey> for DWrappedKey {
    fn from(key: WrappedKey) -> Self {
        Self(key)
    }
}

impl Decode<'_, Sqlite> for DWrappedKey {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let db_val = <String as Decode<Sqlite>>::decode(value)?;
        let key = db_val.parse::<WrappedKey>()?;
        Ok(Self(key))
    }
}

impl Encode<'_, Sqlite> for DWrappedKey {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.0.to_string().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for DWrappedKey {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}
