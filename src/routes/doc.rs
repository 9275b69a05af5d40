use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, SignupRequest},
        cart::{AddToCartRequest, CartList, UpdateCartQuantityRequest},
        orders::{CartOrderRequest, CartOrderSummary, DirectOrderRequest, OrderConfirmation, OrderList},
        products::{AddReviewRequest, AdjustProductRequest, CreateProductRequest, ProductList},
        users::{ChangePasswordRequest, UpdateAccountRequest, UserList},
    },
    models::{Account, CartItem, Location, Order, Product, Review},
    response::{ApiResponse, Meta},
    routes::{admin, cart, health, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        users::signup,
        users::login,
        users::get_account,
        users::update_account,
        users::change_password,
        users::add_location,
        products::find_products,
        products::products_by_category,
        products::get_product,
        products::add_review,
        cart::cart_list,
        cart::add_to_cart,
        cart::set_quantity,
        cart::decrement,
        cart::remove_from_cart,
        orders::order_product,
        orders::order_cart,
        orders::list_orders,
        orders::get_order,
        orders::receive_order,
        admin::create_product,
        admin::adjust_product,
        admin::delete_product,
        admin::delete_all_products,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::deliver_order,
        admin::delete_order,
        admin::delete_all_orders,
        admin::delete_user_orders,
        admin::list_all_cart_items,
        admin::get_cart_item,
        admin::delete_all_cart_items,
        admin::list_users,
        admin::delete_user,
        admin::delete_all_users
    ),
    components(
        schemas(
            Account,
            Location,
            Product,
            Review,
            CartItem,
            Order,
            SignupRequest,
            LoginRequest,
            AuthResponse,
            UpdateAccountRequest,
            ChangePasswordRequest,
            UserList,
            CreateProductRequest,
            AdjustProductRequest,
            AddReviewRequest,
            ProductList,
            AddToCartRequest,
            UpdateCartQuantityRequest,
            CartList,
            DirectOrderRequest,
            CartOrderRequest,
            OrderConfirmation,
            CartOrderSummary,
            OrderList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::SortOrder,
            health::HealthData,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<CartList>,
            ApiResponse<Account>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Users", description = "Signup, login and account endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order placement and tracking"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_workflow_routes_are_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/orders/product/{product_id}",
            "/api/orders/cart",
            "/api/orders/{id}/receive",
            "/api/admin/orders/{id}/deliver",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing from OpenAPI");
        }
    }
}
