diesel::table! {
    inventory (machine_id, id) {
        machine_id -> Text,
        id -> Text,
        name -> Text,
        price -> Float8,
        quantity -> Int4,
        category -> Text,
        slot -> Text,
        image -> Nullable<Text>,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    orders (order_id) {
        order_id -> Text,
        machine_id -> Text,
        items -> Jsonb,
        total_amount -> Float8,
        payment_status -> Text,
        customer_name -> Text,
        customer_phone -> Text,
        payment_id -> Nullable<Text>,
        payment_amount -> Nullable<Float8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(inventory, orders);
