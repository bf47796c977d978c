use chatgate_protocol::openai::list_models::ListModelsResponse;

/// Drop every model the caller may not see from an upstream model list.
pub fn transform_response<F>(mut response: ListModelsResponse, visible: F) -> ListModelsResponse
where
    F: Fn(&str) -> bool,
{
    response.data.retain(|model| visible(&model.id));
    response
}
