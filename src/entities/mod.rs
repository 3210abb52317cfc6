pub mod contact;
pub mod document_sequence;

// Documents and their owned line items
pub mod delivery;
pub mod delivery_item;
pub mod invoice;
pub mod invoice_item;
pub mod payment;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod quotation;
pub mod quotation_item;
pub mod sales_order;
pub mod sales_order_item;

// Sales process aggregate and its N:M link tables
pub mod process_delivery;
pub mod process_invoice;
pub mod sales_process;
