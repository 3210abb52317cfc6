use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_contacts_and_sequences::Migration),
            Box::new(m20260101_000002_create_sales_documents::Migration),
            Box::new(m20260101_000003_create_procurement_documents::Migration),
            Box::new(m20260101_000004_create_invoicing_tables::Migration),
            Box::new(m20260101_000005_create_sales_processes::Migration),
        ]
    }
}

/// Monetary column: NUMERIC(16,4), non-null, defaulting to zero.
/// SQLite rejects a declared precision above 16.
fn money<T: IntoIden>(column: T) -> ColumnDef {
    ColumnDef::new(column)
        .decimal_len(16, 4)
        .not_null()
        .default(0)
        .to_owned()
}

fn id_column<T: IntoIden>(column: T) -> ColumnDef {
    ColumnDef::new(column)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

async fn index(
    manager: &SchemaManager<'_>,
    name: &str,
    table: impl IntoIden + 'static,
    column: impl IntoIden + 'static,
) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .if_not_exists()
                .name(name)
                .table(table)
                .col(column)
                .to_owned(),
        )
        .await
}

mod m20260101_000001_create_contacts_and_sequences {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_contacts_and_sequences"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Contacts::Table)
                        .if_not_exists()
                        .col(id_column(Contacts::Id))
                        .col(ColumnDef::new(Contacts::Name).string().not_null())
                        .col(ColumnDef::new(Contacts::Email).string().null())
                        .col(ColumnDef::new(Contacts::Company).string().null())
                        .col(
                            ColumnDef::new(Contacts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DocumentSequences::Table)
                        .if_not_exists()
                        .col(id_column(DocumentSequences::Id))
                        .col(
                            ColumnDef::new(DocumentSequences::Prefix)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(DocumentSequences::Year).integer().not_null())
                        .col(
                            ColumnDef::new(DocumentSequences::LastValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            // One counter per prefix and year; concurrent first use of a new
            // year resolves through this constraint.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_document_sequences_prefix_year")
                        .table(DocumentSequences::Table)
                        .col(DocumentSequences::Prefix)
                        .col(DocumentSequences::Year)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DocumentSequences::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Contacts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Contacts {
        Table,
        Id,
        Name,
        Email,
        Company,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum DocumentSequences {
        Table,
        Id,
        Prefix,
        Year,
        LastValue,
    }
}

mod m20260101_000002_create_sales_documents {
    use super::m20260101_000001_create_contacts_and_sequences::Contacts;
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_sales_documents"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Quotations::Table)
                        .if_not_exists()
                        .col(id_column(Quotations::Id))
                        .col(
                            ColumnDef::new(Quotations::QuotationNumber)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Quotations::ContactId).big_integer().not_null())
                        .col(ColumnDef::new(Quotations::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Quotations::IssueDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Quotations::ValidUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(money(Quotations::Subtotal))
                        .col(money(Quotations::TaxAmount))
                        .col(money(Quotations::DiscountAmount))
                        .col(money(Quotations::GrandTotal))
                        .col(ColumnDef::new(Quotations::Notes).text().null())
                        .col(
                            ColumnDef::new(Quotations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Quotations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_quotations_contact_id")
                                .from(Quotations::Table, Quotations::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_quotations_contact_id", Quotations::Table, Quotations::ContactId).await?;
            index(manager, "idx_quotations_status", Quotations::Table, Quotations::Status).await?;

            manager
                .create_table(
                    Table::create()
                        .table(QuotationItems::Table)
                        .if_not_exists()
                        .col(id_column(QuotationItems::Id))
                        .col(
                            ColumnDef::new(QuotationItems::QuotationId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(QuotationItems::Position).integer().not_null())
                        .col(ColumnDef::new(QuotationItems::Description).string().not_null())
                        .col(money(QuotationItems::Quantity))
                        .col(money(QuotationItems::UnitPrice))
                        .col(money(QuotationItems::LineTotal))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_quotation_items_quotation_id")
                                .from(QuotationItems::Table, QuotationItems::QuotationId)
                                .to(Quotations::Table, Quotations::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_quotation_items_quotation_id",
                QuotationItems::Table,
                QuotationItems::QuotationId,
            )
            .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(id_column(SalesOrders::Id))
                        .col(
                            ColumnDef::new(SalesOrders::OrderNumber)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SalesOrders::ContactId).big_integer().not_null())
                        .col(ColumnDef::new(SalesOrders::QuotationId).big_integer().null())
                        .col(ColumnDef::new(SalesOrders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(SalesOrders::OrderDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(money(SalesOrders::Subtotal))
                        .col(money(SalesOrders::TaxAmount))
                        .col(money(SalesOrders::DiscountAmount))
                        .col(money(SalesOrders::GrandTotal))
                        .col(ColumnDef::new(SalesOrders::Notes).text().null())
                        .col(
                            ColumnDef::new(SalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_orders_contact_id")
                                .from(SalesOrders::Table, SalesOrders::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_orders_quotation_id")
                                .from(SalesOrders::Table, SalesOrders::QuotationId)
                                .to(Quotations::Table, Quotations::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_sales_orders_contact_id", SalesOrders::Table, SalesOrders::ContactId).await?;
            index(manager, "idx_sales_orders_quotation_id", SalesOrders::Table, SalesOrders::QuotationId).await?;
            index(manager, "idx_sales_orders_status", SalesOrders::Table, SalesOrders::Status).await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderItems::Table)
                        .if_not_exists()
                        .col(id_column(SalesOrderItems::Id))
                        .col(
                            ColumnDef::new(SalesOrderItems::SalesOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderItems::Position).integer().not_null())
                        .col(ColumnDef::new(SalesOrderItems::Description).string().not_null())
                        .col(money(SalesOrderItems::Quantity))
                        .col(money(SalesOrderItems::UnitPrice))
                        .col(money(SalesOrderItems::LineTotal))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_items_sales_order_id")
                                .from(SalesOrderItems::Table, SalesOrderItems::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_sales_order_items_sales_order_id",
                SalesOrderItems::Table,
                SalesOrderItems::SalesOrderId,
            )
            .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(QuotationItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Quotations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Quotations {
        Table,
        Id,
        QuotationNumber,
        ContactId,
        Status,
        IssueDate,
        ValidUntil,
        Subtotal,
        TaxAmount,
        DiscountAmount,
        GrandTotal,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum QuotationItems {
        Table,
        Id,
        QuotationId,
        Position,
        Description,
        Quantity,
        UnitPrice,
        LineTotal,
    }

    #[derive(DeriveIden)]
    pub enum SalesOrders {
        Table,
        Id,
        OrderNumber,
        ContactId,
        QuotationId,
        Status,
        OrderDate,
        Subtotal,
        TaxAmount,
        DiscountAmount,
        GrandTotal,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesOrderItems {
        Table,
        Id,
        SalesOrderId,
        Position,
        Description,
        Quantity,
        UnitPrice,
        LineTotal,
    }
}

mod m20260101_000003_create_procurement_documents {
    use super::m20260101_000001_create_contacts_and_sequences::Contacts;
    use super::m20260101_000002_create_sales_documents::SalesOrders;
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_procurement_documents"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(id_column(PurchaseOrders::Id))
                        .col(
                            ColumnDef::new(PurchaseOrders::PoNumber)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::ContactId).big_integer().not_null())
                        .col(ColumnDef::new(PurchaseOrders::SalesOrderId).big_integer().null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::OrderDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ExpectedDelivery)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(money(PurchaseOrders::Subtotal))
                        .col(money(PurchaseOrders::TaxAmount))
                        .col(money(PurchaseOrders::DiscountAmount))
                        .col(money(PurchaseOrders::GrandTotal))
                        .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_orders_contact_id")
                                .from(PurchaseOrders::Table, PurchaseOrders::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_orders_sales_order_id")
                                .from(PurchaseOrders::Table, PurchaseOrders::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_purchase_orders_sales_order_id",
                PurchaseOrders::Table,
                PurchaseOrders::SalesOrderId,
            )
            .await?;
            index(manager, "idx_purchase_orders_status", PurchaseOrders::Table, PurchaseOrders::Status).await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(id_column(PurchaseOrderItems::Id))
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::Position).integer().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Description)
                                .string()
                                .not_null(),
                        )
                        .col(money(PurchaseOrderItems::Quantity))
                        .col(money(PurchaseOrderItems::UnitPrice))
                        .col(money(PurchaseOrderItems::LineTotal))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_purchase_order_id")
                                .from(PurchaseOrderItems::Table, PurchaseOrderItems::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_purchase_order_items_purchase_order_id",
                PurchaseOrderItems::Table,
                PurchaseOrderItems::PurchaseOrderId,
            )
            .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Deliveries::Table)
                        .if_not_exists()
                        .col(id_column(Deliveries::Id))
                        .col(
                            ColumnDef::new(Deliveries::DeliveryNumber)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Deliveries::ContactId).big_integer().not_null())
                        .col(ColumnDef::new(Deliveries::PurchaseOrderId).big_integer().null())
                        .col(ColumnDef::new(Deliveries::SalesOrderId).big_integer().null())
                        .col(ColumnDef::new(Deliveries::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Deliveries::DeliveryDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Deliveries::ShippingAddress).text().null())
                        .col(ColumnDef::new(Deliveries::TrackingNumber).string().null())
                        .col(ColumnDef::new(Deliveries::Notes).text().null())
                        .col(
                            ColumnDef::new(Deliveries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_contact_id")
                                .from(Deliveries::Table, Deliveries::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_purchase_order_id")
                                .from(Deliveries::Table, Deliveries::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_sales_order_id")
                                .from(Deliveries::Table, Deliveries::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_deliveries_purchase_order_id",
                Deliveries::Table,
                Deliveries::PurchaseOrderId,
            )
            .await?;
            index(manager, "idx_deliveries_sales_order_id", Deliveries::Table, Deliveries::SalesOrderId).await?;
            index(manager, "idx_deliveries_status", Deliveries::Table, Deliveries::Status).await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryItems::Table)
                        .if_not_exists()
                        .col(id_column(DeliveryItems::Id))
                        .col(ColumnDef::new(DeliveryItems::DeliveryId).big_integer().not_null())
                        .col(ColumnDef::new(DeliveryItems::Position).integer().not_null())
                        .col(ColumnDef::new(DeliveryItems::Description).string().not_null())
                        .col(money(DeliveryItems::Quantity))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_delivery_items_delivery_id")
                                .from(DeliveryItems::Table, DeliveryItems::DeliveryId)
                                .to(Deliveries::Table, Deliveries::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_delivery_items_delivery_id", DeliveryItems::Table, DeliveryItems::DeliveryId).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Deliveries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        ContactId,
        SalesOrderId,
        Status,
        OrderDate,
        ExpectedDelivery,
        Subtotal,
        TaxAmount,
        DiscountAmount,
        GrandTotal,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        Position,
        Description,
        Quantity,
        UnitPrice,
        LineTotal,
    }

    #[derive(DeriveIden)]
    enum Deliveries {
        Table,
        Id,
        DeliveryNumber,
        ContactId,
        PurchaseOrderId,
        SalesOrderId,
        Status,
        DeliveryDate,
        ShippingAddress,
        TrackingNumber,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum DeliveryItems {
        Table,
        Id,
        DeliveryId,
        Position,
        Description,
        Quantity,
    }
}

mod m20260101_000004_create_invoicing_tables {
    use super::m20260101_000001_create_contacts_and_sequences::Contacts;
    use super::m20260101_000002_create_sales_documents::SalesOrders;
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_invoicing_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(id_column(Invoices::Id))
                        .col(
                            ColumnDef::new(Invoices::InvoiceNumber)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Invoices::ContactId).big_integer().not_null())
                        .col(ColumnDef::new(Invoices::SalesOrderId).big_integer().null())
                        .col(ColumnDef::new(Invoices::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Invoices::IssueDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::DueDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(money(Invoices::Subtotal))
                        .col(money(Invoices::TaxAmount))
                        .col(money(Invoices::DiscountAmount))
                        .col(money(Invoices::GrandTotal))
                        .col(money(Invoices::AmountPaid))
                        .col(ColumnDef::new(Invoices::Notes).text().null())
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_contact_id")
                                .from(Invoices::Table, Invoices::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_sales_order_id")
                                .from(Invoices::Table, Invoices::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_invoices_sales_order_id", Invoices::Table, Invoices::SalesOrderId).await?;
            index(manager, "idx_invoices_status", Invoices::Table, Invoices::Status).await?;
            index(manager, "idx_invoices_due_date", Invoices::Table, Invoices::DueDate).await?;

            manager
                .create_table(
                    Table::create()
                        .table(InvoiceItems::Table)
                        .if_not_exists()
                        .col(id_column(InvoiceItems::Id))
                        .col(ColumnDef::new(InvoiceItems::InvoiceId).big_integer().not_null())
                        .col(ColumnDef::new(InvoiceItems::Position).integer().not_null())
                        .col(ColumnDef::new(InvoiceItems::Description).string().not_null())
                        .col(money(InvoiceItems::Quantity))
                        .col(money(InvoiceItems::UnitPrice))
                        .col(money(InvoiceItems::LineTotal))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoice_items_invoice_id")
                                .from(InvoiceItems::Table, InvoiceItems::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_invoice_items_invoice_id", InvoiceItems::Table, InvoiceItems::InvoiceId).await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(id_column(Payments::Id))
                        .col(ColumnDef::new(Payments::InvoiceId).big_integer().not_null())
                        .col(money(Payments::Amount))
                        .col(
                            ColumnDef::new(Payments::PaymentDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Method).string_len(32).not_null())
                        .col(ColumnDef::new(Payments::Reference).string().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_invoice_id")
                                .from(Payments::Table, Payments::InvoiceId)
                                .to(Invoices::Table, Invoices::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_payments_invoice_id", Payments::Table, Payments::InvoiceId).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InvoiceItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        InvoiceNumber,
        ContactId,
        SalesOrderId,
        Status,
        IssueDate,
        DueDate,
        Subtotal,
        TaxAmount,
        DiscountAmount,
        GrandTotal,
        AmountPaid,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InvoiceItems {
        Table,
        Id,
        InvoiceId,
        Position,
        Description,
        Quantity,
        UnitPrice,
        LineTotal,
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        InvoiceId,
        Amount,
        PaymentDate,
        Method,
        Reference,
        CreatedAt,
    }
}

mod m20260101_000005_create_sales_processes {
    use super::m20260101_000001_create_contacts_and_sequences::Contacts;
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000005_create_sales_processes"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Document references carry no foreign keys: a document may be
            // deleted while a process still points at it.
            manager
                .create_table(
                    Table::create()
                        .table(SalesProcesses::Table)
                        .if_not_exists()
                        .col(id_column(SalesProcesses::Id))
                        .col(ColumnDef::new(SalesProcesses::Title).string().not_null())
                        .col(ColumnDef::new(SalesProcesses::ContactId).big_integer().not_null())
                        .col(ColumnDef::new(SalesProcesses::Status).string_len(32).not_null())
                        .col(ColumnDef::new(SalesProcesses::QuotationId).big_integer().null())
                        .col(ColumnDef::new(SalesProcesses::SalesOrderId).big_integer().null())
                        .col(ColumnDef::new(SalesProcesses::PurchaseOrderId).big_integer().null())
                        .col(ColumnDef::new(SalesProcesses::Notes).text().null())
                        .col(
                            ColumnDef::new(SalesProcesses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesProcesses::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_processes_contact_id")
                                .from(SalesProcesses::Table, SalesProcesses::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_sales_processes_contact_id", SalesProcesses::Table, SalesProcesses::ContactId).await?;
            index(manager, "idx_sales_processes_status", SalesProcesses::Table, SalesProcesses::Status).await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProcessDeliveries::Table)
                        .if_not_exists()
                        .col(id_column(ProcessDeliveries::Id))
                        .col(ColumnDef::new(ProcessDeliveries::ProcessId).big_integer().not_null())
                        .col(ColumnDef::new(ProcessDeliveries::DeliveryId).big_integer().not_null())
                        .col(
                            ColumnDef::new(ProcessDeliveries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_process_deliveries_process_id")
                                .from(ProcessDeliveries::Table, ProcessDeliveries::ProcessId)
                                .to(SalesProcesses::Table, SalesProcesses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_process_deliveries_process_id",
                ProcessDeliveries::Table,
                ProcessDeliveries::ProcessId,
            )
            .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProcessInvoices::Table)
                        .if_not_exists()
                        .col(id_column(ProcessInvoices::Id))
                        .col(ColumnDef::new(ProcessInvoices::ProcessId).big_integer().not_null())
                        .col(ColumnDef::new(ProcessInvoices::InvoiceId).big_integer().not_null())
                        .col(
                            ColumnDef::new(ProcessInvoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_process_invoices_process_id")
                                .from(ProcessInvoices::Table, ProcessInvoices::ProcessId)
                                .to(SalesProcesses::Table, SalesProcesses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_process_invoices_process_id",
                ProcessInvoices::Table,
                ProcessInvoices::ProcessId,
            )
            .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProcessInvoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProcessDeliveries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesProcesses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SalesProcesses {
        Table,
        Id,
        Title,
        ContactId,
        Status,
        QuotationId,
        SalesOrderId,
        PurchaseOrderId,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProcessDeliveries {
        Table,
        Id,
        ProcessId,
        DeliveryId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProcessInvoices {
        Table,
        Id,
        ProcessId,
        InvoiceId,
        CreatedAt,
    }
}
