//! Create the sites table with its favicon cache columns

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sites::Table)
                    .if_not_exists()
                    .col(self.create_id_column(manager, Sites::Id).primary_key())
                    .col(ColumnDef::new(Sites::Name).string().not_null())
                    .col(ColumnDef::new(Sites::AllowedOrigin).string().not_null())
                    .col(
                        ColumnDef::new(Sites::FaviconOrigin)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Sites::FaviconData).binary().not_null())
                    .col(
                        ColumnDef::new(Sites::FaviconContentType)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(self.create_nullable_timestamp_column(manager, Sites::FaviconFetchedAt))
                    .col(self.create_nullable_timestamp_column(
                        manager,
                        Sites::FaviconLastAttemptAt,
                    ))
                    .col(self.create_timestamp_column(manager, Sites::CreatedAt))
                    .col(self.create_timestamp_column(manager, Sites::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sites_allowed_origin")
                    .table(Sites::Table)
                    .col(Sites::AllowedOrigin)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sites::Table).to_owned())
            .await
    }
}

impl Migration {
    fn create_id_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn create_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn create_nullable_timestamp_column(
        &self,
        manager: &SchemaManager,
        column: impl IntoIden,
    ) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone(),
            _ => col.string(),
        };
        col
    }
}

#[derive(DeriveIden)]
enum Sites {
    Table,
    Id,
    Name,
    AllowedOrigin,
    FaviconOrigin,
    FaviconData,
    FaviconContentType,
    FaviconFetchedAt,
    FaviconLastAttemptAt,
    CreatedAt,
    UpdatedAt,
}
