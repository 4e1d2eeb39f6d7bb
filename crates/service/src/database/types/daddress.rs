use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

use common::wallet::Address;

/// Wallet address column, stored in its normalized lower-case form
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct DAddress(Address);

impl From<DAddress> for Address {
    fn from(val: DAddress) -> Self {
        val.0
    }
}

impl From<Address> for DAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<&Address> for DAddress {
    fn from(address: &Address) -> Self {
        Self(address.clone())
    }
}

impl std::ops::Deref for DAddress {
    type Target = Address;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Decode<'_, Sqlite> for DAddress {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let db_val = <String as Decode<Sqlite>>::decode(value)?;
        let address = db_val.parse::<Address>()?;
        Ok(Self(address))
    }
}

impl Encode<'_, Sqlite> for DAddress {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.0.as_str().to_string().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for DAddress {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}
