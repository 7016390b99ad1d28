use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_identity_tables::Migration),
            Box::new(m20240301_000002_create_catalog_tables::Migration),
            Box::new(m20240301_000003_create_cart_tables::Migration),
            Box::new(m20240301_000004_create_payment_tables::Migration),
            Box::new(m20240301_000005_seed_reference_rows::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_identity_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_identity_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Users::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Roles::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Roles::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Roles::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UserRoles::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserRoles::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(UserRoles::UserId).big_integer().not_null())
                        .col(ColumnDef::new(UserRoles::RoleId).big_integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .from(UserRoles::Table, UserRoles::UserId)
                                .to(Users::Table, Users::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .from(UserRoles::Table, UserRoles::RoleId)
                                .to(Roles::Table, Roles::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_user_roles_user_role")
                        .table(UserRoles::Table)
                        .col(UserRoles::UserId)
                        .col(UserRoles::RoleId)
                        .unique()
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Users {
        Table,
        Id,
        Email,
        Name,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Roles {
        Table,
        Id,
        Name,
    }

    #[derive(DeriveIden)]
    pub enum UserRoles {
        Table,
        Id,
        UserId,
        RoleId,
    }
}

mod m20240301_000002_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::TaxRate)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRecords::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::ProductId)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::AvailableQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .from(StockRecords::Table, StockRecords::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Products {
        Table,
        Id,
        Name,
        Price,
        TaxRate,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum StockRecords {
        Table,
        Id,
        ProductId,
        AvailableQuantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Carts::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Carts::UserRoleId).big_integer().not_null())
                        .col(ColumnDef::new(Carts::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One Active cart per role. Partial indexes are supported by both
            // Postgres and SQLite; sea-query has no builder for them.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS ux_carts_active_owner \
                     ON carts (user_role_id) WHERE status = 'active'",
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CartLines::CartId).big_integer().not_null())
                        .col(
                            ColumnDef::new(CartLines::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .from(CartLines::Table, CartLines::CartId)
                                .to(Carts::Table, Carts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_cart_lines_cart_product")
                        .table(CartLines::Table)
                        .col(CartLines::CartId)
                        .col(CartLines::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Carts {
        Table,
        Id,
        UserRoleId,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum CartLines {
        Table,
        Id,
        CartId,
        ProductId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_payment_tables {
    use super::m20240301_000003_create_cart_tables::Carts;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_payment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentStatuses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentStatuses::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentStatuses::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Payments::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Payments::CartId).big_integer().not_null())
                        .col(
                            ColumnDef::new(Payments::PaymentMethod)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::PaymentStatusId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::ReferenceNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .from(Payments::Table, Payments::CartId)
                                .to(Carts::Table, Carts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .from(Payments::Table, Payments::PaymentStatusId)
                                .to(PaymentStatuses::Table, PaymentStatuses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentDetails::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentDetails::PaymentId)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentDetails::EncodedHolderName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentDetails::EncodedCardNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentDetails::Expiration)
                                .string_len(5)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentDetails::Installments).integer().null())
                        .foreign_key(
                            ForeignKey::create()
                                .from(PaymentDetails::Table, PaymentDetails::PaymentId)
                                .to(Payments::Table, Payments::Id),
                        )
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum PaymentStatuses {
        Table,
        Id,
        Name,
    }

    #[derive(DeriveIden)]
    pub enum Payments {
        Table,
        Id,
        CartId,
        PaymentMethod,
        PaymentStatusId,
        ReferenceNumber,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum PaymentDetails {
        Table,
        Id,
        PaymentId,
        EncodedHolderName,
        EncodedCardNumber,
        Expiration,
        Installments,
    }
}

mod m20240301_000005_seed_reference_rows {
    use super::m20240301_000001_create_identity_tables::Roles;
    use super::m20240301_000004_create_payment_tables::PaymentStatuses;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_seed_reference_rows"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut seed_statuses = Query::insert()
                .into_table(PaymentStatuses::Table)
                .columns([PaymentStatuses::Name])
                .on_conflict(
                    OnConflict::column(PaymentStatuses::Name)
                        .do_nothing()
                        .to_owned(),
                )
                .to_owned();
            for name in [
                crate::entities::payment_status::PENDING,
                crate::entities::payment_status::APPROVED,
                crate::entities::payment_status::REJECTED,
                crate::entities::payment_status::CANCELLED,
                crate::entities::payment_status::REFUNDED,
                crate::entities::payment_status::FAILED,
            ] {
                seed_statuses.values_panic([name.into()]);
            }
            manager.exec_stmt(seed_statuses).await?;

            let mut seed_roles = Query::insert()
                .into_table(Roles::Table)
                .columns([Roles::Name])
                .on_conflict(OnConflict::column(Roles::Name).do_nothing().to_owned())
                .to_owned();
            for name in [crate::entities::role::BUYER, "admin"] {
                seed_roles.values_panic([name.into()]);
            }
            manager.exec_stmt(seed_roles).await?;

            Ok(())
        }
    }
}
